pub use ethereum_consensus::serde::{as_str, seq_of_str};
