mod assessment;
mod common;
