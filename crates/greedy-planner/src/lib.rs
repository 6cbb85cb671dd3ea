pub mod ppi;
pub mod shortlist;

pub use ppi::{run_greedy, GreedyRun};
pub use shortlist::{greedy_floor_and_shortlist, shortlist_cap, GreedyResult};
