//! Client-side roster workflow for a single subject.
//!
//! [`RosterController`] owns the view state and talks to the service through
//! a [`RosterGateway`]. Adding students goes through an [`EnrollmentEditor`];
//! removing them goes through a [`ConfirmationGate`].

pub mod confirm;
pub mod editor;
pub mod gateway;
pub mod roster;

pub use confirm::{AutoConfirm, ConfirmationGate};
pub use editor::{filter_students, matches_search, EditorEmptyReason, EnrollmentEditor};
pub use gateway::{GatewayError, HttpRosterGateway, RosterGateway};
pub use roster::{
    LoadOutcome, RemoveOutcome, RosterController, RosterError, RosterEvent, RosterState,
    RosterView,
};
