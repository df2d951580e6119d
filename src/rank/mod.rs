pub use table::{RankChange, RankTable, RankTier};

mod table;
