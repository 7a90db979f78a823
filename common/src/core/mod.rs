pub mod image_file_repository;
pub mod rabbitmq_connection;
pub mod rabbitmq_message_repository;
