pub mod domain;
pub mod engine;
pub mod ports;

pub use domain::{Booking, BookingEvent, BookingStatus, CreateBooking, Space, User};
pub use engine::{BookingEngine, BookingError};
pub use ports::{BookingStore, PortError, PortResult, SpaceLookup, UserLookup};
