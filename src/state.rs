//! Violation document states
use std::fmt;

/// Index space -1..=3. Only `Draft`, `NeedApprove` and `Approved` are ever
/// persisted. `EmailSent` is reserved and no transition produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViolationState {
    Undefined,
    Draft,
    NeedApprove,
    Approved,
    EmailSent,
}

impl ViolationState {
    pub fn index(&self) -> i8 {
        match self {
            ViolationState::Undefined => -1,
            ViolationState::Draft => 0,
            ViolationState::NeedApprove => 1,
            ViolationState::Approved => 2,
            ViolationState::EmailSent => 3,
        }
    }

    /// Out of range values map to `Undefined`.
    pub fn from_index(value: i64) -> Self {
        match value {
            0 => ViolationState::Draft,
            1 => ViolationState::NeedApprove,
            2 => ViolationState::Approved,
            3 => ViolationState::EmailSent,
            _ => ViolationState::Undefined,
        }
    }

    /// Initial state for a new document. Anything but Draft or NeedApprove becomes Draft.
    pub fn coerce_initial(requested: ViolationState) -> Self {
        match requested {
            ViolationState::NeedApprove => ViolationState::NeedApprove,
            _ => ViolationState::Draft,
        }
    }

    /// Draft and NeedApprove documents can still be edited or deleted.
    pub fn is_open(&self) -> bool {
        matches!(self, ViolationState::Draft | ViolationState::NeedApprove)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationState::Undefined => "Undefined",
            ViolationState::Draft => "Draft",
            ViolationState::NeedApprove => "NeedApprove",
            ViolationState::Approved => "Approved",
            ViolationState::EmailSent => "EmailSent",
        }
    }
}

impl fmt::Display for ViolationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<C> minicbor::Encode<C> for ViolationState {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i8(self.index())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for ViolationState {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let index = d.i64()?;
        Ok(ViolationState::from_index(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_boundaries() {
        assert_eq!(ViolationState::from_index(-1), ViolationState::Undefined);
        assert_eq!(ViolationState::from_index(-2), ViolationState::Undefined);
        assert_eq!(ViolationState::from_index(4), ViolationState::Undefined);
        assert_eq!(ViolationState::from_index(3), ViolationState::EmailSent);
        assert_eq!(ViolationState::Approved.index(), 2);
    }

    #[test]
    fn initial_state_is_coerced() {
        use ViolationState::*;
        assert_eq!(ViolationState::coerce_initial(NeedApprove), NeedApprove);
        for s in [Undefined, Draft, Approved, EmailSent] {
            assert_eq!(ViolationState::coerce_initial(s), Draft);
        }
    }

    #[test]
    fn state_survives_cbor() {
        let encoded = minicbor::to_vec(ViolationState::NeedApprove).unwrap();
        let decoded: ViolationState = minicbor::decode(&encoded).unwrap();
        assert_eq!(decoded, ViolationState::NeedApprove);
    }
}
