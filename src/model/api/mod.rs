pub mod dump;
pub mod receipt;
pub mod results;
pub mod voter;
