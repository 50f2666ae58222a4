use std::fmt;

/// Lifecycle of an opened producer.
///
/// A producer that has not been opened yet has no session value at all, so the
/// unopened state is expressed by the absence of a session rather than a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProducerState {
    /// Accepting sends.
    Open,
    /// The flush barrier has been entered; no further sends are accepted.
    Flushing,
    /// Released. Terminal.
    Closed,
}

impl ProducerState {
    /// Whether new messages may be submitted in this state.
    pub const fn accepts_sends(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ProducerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Flushing => "flushing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
