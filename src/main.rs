#[tokio::main]
async fn main() {
    if let Err(e) = telemed_lib::run().await {
        eprintln!("telemed: {e}");
        std::process::exit(1);
    }
}
