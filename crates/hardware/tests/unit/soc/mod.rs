/// Region registration, routing, straddling and dirty tracking.
pub mod address_space;
