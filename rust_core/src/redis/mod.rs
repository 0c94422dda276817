pub mod bus;

pub use bus::{RedisBus, RedisSink, RedisSinkMode};
