pub mod documents;
pub mod health;
pub mod punchlist;
pub mod reviews;
