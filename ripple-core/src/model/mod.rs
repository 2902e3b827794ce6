//! Run data model: ripples, verdicts, wave records, snapshots, tribunal
//! records and evidence packs.

pub mod evidence;
pub mod ripple;
pub mod snapshot;
pub mod tribunal;
pub mod verdict;
pub mod wave;

pub use evidence::{EvidencePack, KeySignal, PropagationStatistics};
pub use ripple::Ripple;
pub use snapshot::{AgentDescriptor, AgentSnapshot, AgentStats, FieldSnapshot, SnapshotParameters};
pub use tribunal::{Challenge, DeliberationRecord, TribunalMember, TribunalOpinion};
pub use verdict::{AgentActivation, AgentSkip, OmniscientVerdict};
pub use wave::{AgentKind, ParticipantResponse, ResponseType, WaveEvent, WaveRecord};
