mod expense;
mod ledger;
mod money;
mod split;
mod user;

pub use expense::*;
pub use ledger::*;
pub use money::*;
pub use split::*;
pub use user::*;
