pub mod user_store;

pub use user_store::{JsonUserStore, StoredUser, UserStore, FIRST_USER_ID};
