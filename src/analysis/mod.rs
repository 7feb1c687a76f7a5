pub mod basic_block;
pub mod control_flow_graph;
pub mod live_value_set;
pub mod liveness;
pub mod reference_map;
