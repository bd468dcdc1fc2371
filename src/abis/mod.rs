pub mod oracle;

pub use oracle::ITwapOracle;
