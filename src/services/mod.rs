pub mod cities;
pub mod collector;
pub mod coordinates;
pub mod geodb;
pub mod openweather;
pub mod parser;
pub mod report;
pub mod scheduler;

#[cfg(test)]
pub mod fakes;
