pub mod plc;
pub mod registers;
pub mod traits;

pub use plc::{ConnectionState, PlcController, READ_FAILED};
pub use registers::{Parameter, RegisterAddress, RegisterMap};
pub use traits::Plc;
