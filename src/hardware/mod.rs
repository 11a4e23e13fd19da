pub mod bus;
pub mod clock;
pub mod peripheral;
pub mod sys;
