mod counters;

pub(crate) use counters::*;
