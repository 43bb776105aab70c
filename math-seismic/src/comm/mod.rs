//! Communication between partitions
//!
//! The solver talks to its peers only through [`Communicator`]; a single
//! process uses [`SerialComm`], in-process ranks use [`ThreadComm`].

mod messaging;
mod serial;
mod threaded;
mod traits;

pub use messaging::*;
pub use serial::*;
pub use threaded::*;
pub use traits::*;
