pub mod repeat_days;
