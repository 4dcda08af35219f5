pub mod appointments;
pub mod auth;
pub mod customers;
pub mod imports;
pub mod inventory;
pub mod orders;
pub mod pets;
pub mod procedures;
pub mod products;
pub mod staff;
pub mod suppliers;
pub mod tenants;
pub mod treatment_plans;
