//! Verification and registration services.

mod rate_limit;
mod registration;
mod verification;

pub use rate_limit::{rate_limit, RequestRateLimiter};
pub use registration::{
    AdminPolicy, RegistrationError, RegistrationReceipt, RegistrationRequest, RegistrationService,
    Requester,
};
pub use verification::{
    OAuthSettings, Rejection, Stage, VerificationEngine, VerificationOutcome, VerificationRequest,
};
