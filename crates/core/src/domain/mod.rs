pub mod interaction;
pub mod lease;
pub mod promo;
pub mod scenario;
