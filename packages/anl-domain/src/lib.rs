pub mod age;
pub mod chart;
pub mod matching;
pub mod profile;
pub mod relationship;
pub mod similarity;
pub mod synastry;
pub mod time_serde;
pub mod trait_merge;
