pub mod compatibility;
pub mod domain;
pub mod matching;
pub mod memory;
pub mod ports;
pub mod service;

pub use domain::{
    AlertStatus, AlertWithHospital, BloodGroup, Donor, DonorResponse, Hospital,
    ResponseStatus, Role, SosAlert, Urgency, User, UserCredentials,
};
pub use ports::{Clock, DatabaseService, PortError, PortResult, SystemClock};
pub use service::{AlertIssued, NewDonor, NewHospital, NewSosAlert, SosService};
