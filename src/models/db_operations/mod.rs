pub mod categories_db_operations;
pub mod gateway;
pub mod posts_db_operations;
pub mod roles_db_operations;
pub mod users_db_operations;
