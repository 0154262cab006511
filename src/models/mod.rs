pub mod appointment;
pub mod enums;
pub mod health_record;
pub mod profile;
pub mod user;

pub use appointment::*;
pub use enums::*;
pub use health_record::*;
pub use profile::*;
pub use user::*;
