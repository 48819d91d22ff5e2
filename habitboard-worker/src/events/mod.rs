pub mod habit_write;
