pub mod register_allocation;
