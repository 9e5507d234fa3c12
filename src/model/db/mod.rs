pub mod audit;
pub mod election;
pub mod reservation;
pub mod vote;
pub mod voter;
