pub mod command_reader;
pub mod expense_writer;
