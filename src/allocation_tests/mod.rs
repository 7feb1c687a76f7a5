mod liveness;
mod gc;
mod walker;
mod allocation;
