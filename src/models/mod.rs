pub mod approval;
pub mod member;
