pub mod support;

mod audit_halt;
mod classification;
mod linear_approach;
mod messaging;
mod prediction;
