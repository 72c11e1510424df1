pub mod api;
pub mod database_ops;
pub mod sync;
pub mod tracing;

pub mod util {
    pub mod env;
}

#[cfg(test)]
mod testing;
