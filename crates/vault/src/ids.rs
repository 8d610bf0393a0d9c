use {
    primitive_types::{H160, H256},
    std::fmt::{self, Display, Formatter},
};

/// Token identifier.
pub type Token = H160;

/// Holder of tokens and pool shares.
pub type Account = H160;

/// How the pool prices swaps, which determines how much of the pool state a
/// swap needs to see.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display, strum::FromRepr)]
#[repr(u16)]
pub enum Specialization {
    /// Needs every balance.
    General = 0,
    /// Needs the balances of the two tokens being swapped.
    MinimalSwapInfo = 1,
    /// Minimal swap info for pools of exactly two tokens.
    TwoToken = 2,
}

/// 32 byte pool identifier. Bytes 20..22 hold the [`Specialization`], the
/// last 10 bytes the registration nonce.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    derive_more::From,
    derive_more::Into,
)]
pub struct PoolId(pub H256);

impl PoolId {
    pub(crate) fn new(nonce: u64, specialization: Specialization) -> Self {
        let mut bytes = [0_u8; 32];
        bytes[20..22].copy_from_slice(&(specialization as u16).to_be_bytes());
        bytes[24..32].copy_from_slice(&nonce.to_be_bytes());
        Self(H256(bytes))
    }

    pub fn specialization(&self) -> Option<Specialization> {
        Specialization::from_repr(u16::from_be_bytes([self.0[20], self.0[21]]))
    }

    pub(crate) fn nonce(&self) -> Option<usize> {
        if self.0[22..24] != [0, 0] {
            return None;
        }
        let mut nonce = [0_u8; 8];
        nonce.copy_from_slice(&self.0[24..32]);
        usize::try_from(u64::from_be_bytes(nonce)).ok()
    }
}

impl Display for PoolId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, hex_literal::hex};

    #[test]
    fn layout() {
        let id = PoolId::new(0x27, Specialization::TwoToken);
        assert_eq!(
            id.0,
            H256(hex!(
                "0000000000000000000000000000000000000000000200000000000000000027"
            ))
        );
        assert_eq!(id.specialization(), Some(Specialization::TwoToken));
        assert_eq!(id.nonce(), Some(0x27));
        assert_eq!(
            id.to_string(),
            "0x0000000000000000000000000000000000000000000200000000000000000027"
        );
    }

    #[test]
    fn rejects_foreign_ids() {
        let id = PoolId(H256(hex!(
            "0000000000000000000000000000000000000000000900000000000000000001"
        )));
        assert_eq!(id.specialization(), None);
        let id = PoolId(H256(hex!(
            "0000000000000000000000000000000000000000000001000000000000000001"
        )));
        assert_eq!(id.nonce(), None);
    }
}
