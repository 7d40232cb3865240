pub mod alphabet;
pub mod convert;
pub mod dot;
pub mod genetic_code;
pub mod structs;
pub mod util;
