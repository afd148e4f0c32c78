//! Scenario setup: build a ready-to-run world from the two config documents.

mod build;

#[cfg(test)]
mod tests;

pub use build::{
    build_allocation_strategy, build_repositioning_strategy, build_world, inject_passenger,
};
