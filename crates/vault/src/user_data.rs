//! ABI codec for the opaque `user_data` of joins and exits.
//!
//! The first 32 byte word is always the kind selector. The remaining words
//! depend on the kind:
//!
//! | kind | layout |
//! |---|---|
//! | `Init` | `(uint256, uint256[] amounts_in)` |
//! | `ExactTokensInForSharesOut` | `(uint256, uint256[] amounts_in, uint256 min_shares_out)` |
//! | `TokenInForExactSharesOut` | `(uint256, uint256 shares_out, uint256 token_index)` |
//! | `AllTokensInForExactSharesOut` | `(uint256, uint256 shares_out)` |
//! | `CollectProtocolFees` | `(uint256)` |
//! | `ExactSharesInForOneTokenOut` | `(uint256, uint256 shares_in, uint256 token_index)` |
//! | `ExactSharesInForTokensOut` | `(uint256, uint256 shares_in)` |
//! | `SharesInForExactTokensOut` | `(uint256, uint256[] amounts_out, uint256 max_shares_in)` |
//! | `ManagementFeeTokensOut` | `(uint256)` |

use {
    crate::{error::Error, pools::PoolType},
    ethabi::{ParamType, Token as AbiToken},
    primitive_types::U256,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JoinKind {
    Init {
        amounts_in: Vec<U256>,
    },
    ExactTokensInForSharesOut {
        amounts_in: Vec<U256>,
        min_shares_out: U256,
    },
    TokenInForExactSharesOut {
        shares_out: U256,
        token_index: usize,
    },
    AllTokensInForExactSharesOut {
        shares_out: U256,
    },
    /// Stable phantom pools only.
    CollectProtocolFees,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExitKind {
    ExactSharesInForOneTokenOut {
        shares_in: U256,
        token_index: usize,
    },
    ExactSharesInForTokensOut {
        shares_in: U256,
    },
    SharesInForExactTokensOut {
        amounts_out: Vec<U256>,
        max_shares_in: U256,
    },
    /// Managed pool owner only. Pays out the management fee shares accrued
    /// since the last withdrawal as proportional tokens.
    ManagementFeeTokensOut,
}

impl JoinKind {
    /// Joins that keep the pool balances proportional.
    pub fn is_proportional(&self) -> bool {
        matches!(self, Self::AllTokensInForExactSharesOut { .. })
    }

    fn selector(&self, pool_type: PoolType) -> Option<u8> {
        let phantom = pool_type == PoolType::StablePhantom;
        match self {
            Self::Init { .. } => Some(0),
            Self::CollectProtocolFees => phantom.then_some(1),
            _ if phantom => None,
            Self::ExactTokensInForSharesOut { .. } => Some(1),
            Self::TokenInForExactSharesOut { .. } => Some(2),
            Self::AllTokensInForExactSharesOut { .. } => Some(3),
        }
    }

    pub fn encode(&self, pool_type: PoolType) -> Result<Vec<u8>, Error> {
        let selector = uint(self.selector(pool_type).ok_or(Error::UnhandledJoinKind)?);
        let tokens = match self {
            Self::Init { amounts_in } => vec![selector, uint_array(amounts_in)],
            Self::ExactTokensInForSharesOut {
                amounts_in,
                min_shares_out,
            } => vec![
                selector,
                uint_array(amounts_in),
                AbiToken::Uint(*min_shares_out),
            ],
            Self::TokenInForExactSharesOut {
                shares_out,
                token_index,
            } => vec![selector, AbiToken::Uint(*shares_out), uint(*token_index)],
            Self::AllTokensInForExactSharesOut { shares_out } => {
                vec![selector, AbiToken::Uint(*shares_out)]
            }
            Self::CollectProtocolFees => vec![selector],
        };
        Ok(ethabi::encode(&tokens))
    }

    pub fn decode(pool_type: PoolType, data: &[u8]) -> Result<Self, Error> {
        let phantom = pool_type == PoolType::StablePhantom;
        match selector(data)? {
            0 => {
                let [_, amounts_in] = decode([uint_type(), uint_array_type()], data)?;
                Ok(Self::Init {
                    amounts_in: to_uint_array(amounts_in)?,
                })
            }
            1 if phantom => {
                decode([uint_type()], data)?;
                Ok(Self::CollectProtocolFees)
            }
            _ if phantom => Err(Error::UnhandledJoinKind),
            1 => {
                let [_, amounts_in, min_shares_out] =
                    decode([uint_type(), uint_array_type(), uint_type()], data)?;
                Ok(Self::ExactTokensInForSharesOut {
                    amounts_in: to_uint_array(amounts_in)?,
                    min_shares_out: to_uint(min_shares_out)?,
                })
            }
            2 => {
                let [_, shares_out, token_index] =
                    decode([uint_type(), uint_type(), uint_type()], data)?;
                Ok(Self::TokenInForExactSharesOut {
                    shares_out: to_uint(shares_out)?,
                    token_index: to_index(token_index)?,
                })
            }
            3 => {
                let [_, shares_out] = decode([uint_type(), uint_type()], data)?;
                Ok(Self::AllTokensInForExactSharesOut {
                    shares_out: to_uint(shares_out)?,
                })
            }
            _ => Err(Error::UnhandledJoinKind),
        }
    }
}

impl ExitKind {
    /// Exits that keep the pool balances proportional.
    pub fn is_proportional(&self) -> bool {
        matches!(
            self,
            Self::ExactSharesInForTokensOut { .. } | Self::ManagementFeeTokensOut
        )
    }

    pub fn encode(&self) -> Vec<u8> {
        let tokens = match self {
            Self::ExactSharesInForOneTokenOut {
                shares_in,
                token_index,
            } => vec![uint(0), AbiToken::Uint(*shares_in), uint(*token_index)],
            Self::ExactSharesInForTokensOut { shares_in } => {
                vec![uint(1), AbiToken::Uint(*shares_in)]
            }
            Self::SharesInForExactTokensOut {
                amounts_out,
                max_shares_in,
            } => vec![
                uint(2),
                uint_array(amounts_out),
                AbiToken::Uint(*max_shares_in),
            ],
            Self::ManagementFeeTokensOut => vec![uint(3)],
        };
        ethabi::encode(&tokens)
    }

    /// Every pool type shares the same exit kinds.
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        match selector(data)? {
            0 => {
                let [_, shares_in, token_index] =
                    decode([uint_type(), uint_type(), uint_type()], data)?;
                Ok(Self::ExactSharesInForOneTokenOut {
                    shares_in: to_uint(shares_in)?,
                    token_index: to_index(token_index)?,
                })
            }
            1 => {
                let [_, shares_in] = decode([uint_type(), uint_type()], data)?;
                Ok(Self::ExactSharesInForTokensOut {
                    shares_in: to_uint(shares_in)?,
                })
            }
            2 => {
                let [_, amounts_out, max_shares_in] =
                    decode([uint_type(), uint_array_type(), uint_type()], data)?;
                Ok(Self::SharesInForExactTokensOut {
                    amounts_out: to_uint_array(amounts_out)?,
                    max_shares_in: to_uint(max_shares_in)?,
                })
            }
            3 => {
                decode([uint_type()], data)?;
                Ok(Self::ManagementFeeTokensOut)
            }
            _ => Err(Error::UnhandledExitKind),
        }
    }
}

fn selector(data: &[u8]) -> Result<u64, Error> {
    let word = data
        .get(..32)
        .map(U256::from_big_endian)
        .ok_or(Error::MalformedUserData)?;
    // Selectors that do not fit are unknown kinds anyway.
    Ok(u64::try_from(word).unwrap_or(u64::MAX))
}

fn decode<const N: usize>(types: [ParamType; N], data: &[u8]) -> Result<[AbiToken; N], Error> {
    ethabi::decode(&types, data)
        .map_err(|_| Error::MalformedUserData)?
        .try_into()
        .map_err(|_| Error::MalformedUserData)
}

fn uint_type() -> ParamType {
    ParamType::Uint(256)
}

fn uint_array_type() -> ParamType {
    ParamType::Array(Box::new(uint_type()))
}

fn uint(value: impl Into<U256>) -> AbiToken {
    AbiToken::Uint(value.into())
}

fn uint_array(values: &[U256]) -> AbiToken {
    AbiToken::Array(values.iter().copied().map(AbiToken::Uint).collect())
}

fn to_uint(token: AbiToken) -> Result<U256, Error> {
    token.into_uint().ok_or(Error::MalformedUserData)
}

fn to_index(token: AbiToken) -> Result<usize, Error> {
    let index = u64::try_from(to_uint(token)?).map_err(|_| Error::OutOfBounds)?;
    usize::try_from(index).map_err(|_| Error::OutOfBounds)
}

fn to_uint_array(token: AbiToken) -> Result<Vec<U256>, Error> {
    token
        .into_array()
        .ok_or(Error::MalformedUserData)?
        .into_iter()
        .map(to_uint)
        .collect()
}

#[cfg(test)]
mod tests {
    use {super::*, hex_literal::hex};

    #[test]
    fn selector_is_the_first_word() {
        let data = JoinKind::AllTokensInForExactSharesOut {
            shares_out: 1.into(),
        }
        .encode(PoolType::Weighted)
        .unwrap();
        assert_eq!(
            data,
            hex!(
                "0000000000000000000000000000000000000000000000000000000000000003"
                "0000000000000000000000000000000000000000000000000000000000000001"
            )
        );

        let data = JoinKind::CollectProtocolFees
            .encode(PoolType::StablePhantom)
            .unwrap();
        assert_eq!(
            data,
            hex!("0000000000000000000000000000000000000000000000000000000000000001")
        );
    }

    #[test]
    fn init_layout() {
        let data = JoinKind::Init {
            amounts_in: vec![100.into(), 200.into()],
        }
        .encode(PoolType::Stable)
        .unwrap();
        assert_eq!(
            data,
            hex!(
                "0000000000000000000000000000000000000000000000000000000000000000"
                "0000000000000000000000000000000000000000000000000000000000000040"
                "0000000000000000000000000000000000000000000000000000000000000002"
                "0000000000000000000000000000000000000000000000000000000000000064"
                "00000000000000000000000000000000000000000000000000000000000000c8"
            )
        );
    }

    #[test]
    fn decodes_what_it_encodes() {
        let joins = [
            JoinKind::ExactTokensInForSharesOut {
                amounts_in: vec![1.into(), 2.into(), 3.into()],
                min_shares_out: 4.into(),
            },
            JoinKind::TokenInForExactSharesOut {
                shares_out: U256::MAX,
                token_index: 19,
            },
        ];
        for join in joins {
            let data = join.encode(PoolType::Managed).unwrap();
            assert_eq!(JoinKind::decode(PoolType::Managed, &data).unwrap(), join);
        }

        let exit = ExitKind::SharesInForExactTokensOut {
            amounts_out: vec![5.into(), 0.into()],
            max_shares_in: 6.into(),
        };
        assert_eq!(ExitKind::decode(&exit.encode()).unwrap(), exit);
    }

    #[test]
    fn management_fee_exit_is_a_bare_selector() {
        let data = ExitKind::ManagementFeeTokensOut.encode();
        assert_eq!(
            data,
            hex!("0000000000000000000000000000000000000000000000000000000000000003")
        );
        assert_eq!(
            ExitKind::decode(&data).unwrap(),
            ExitKind::ManagementFeeTokensOut
        );
        assert!(ExitKind::ManagementFeeTokensOut.is_proportional());
    }

    #[test]
    fn phantom_pools_have_their_own_join_kinds() {
        let data = JoinKind::ExactTokensInForSharesOut {
            amounts_in: vec![1.into()],
            min_shares_out: 0.into(),
        }
        .encode(PoolType::Stable)
        .unwrap();
        // Selector 1 means collecting protocol fees for phantom pools.
        assert_eq!(
            JoinKind::decode(PoolType::StablePhantom, &data).unwrap(),
            JoinKind::CollectProtocolFees
        );
        assert!(matches!(
            JoinKind::TokenInForExactSharesOut {
                shares_out: 1.into(),
                token_index: 0
            }
            .encode(PoolType::StablePhantom),
            Err(Error::UnhandledJoinKind)
        ));
        assert!(matches!(
            JoinKind::CollectProtocolFees.encode(PoolType::Weighted),
            Err(Error::UnhandledJoinKind)
        ));
    }

    #[test]
    fn rejects_malformed_data() {
        assert!(matches!(
            JoinKind::decode(PoolType::Weighted, &[]),
            Err(Error::MalformedUserData)
        ));
        // Selector only, the amounts are missing.
        assert!(matches!(
            JoinKind::decode(PoolType::Weighted, &ethabi::encode(&[uint(0)])),
            Err(Error::MalformedUserData)
        ));
        assert!(matches!(
            JoinKind::decode(PoolType::Weighted, &ethabi::encode(&[uint(4)])),
            Err(Error::UnhandledJoinKind)
        ));
        assert!(matches!(
            ExitKind::decode(&ethabi::encode(&[uint(4)])),
            Err(Error::UnhandledExitKind)
        ));
        assert!(matches!(
            ExitKind::decode(&ethabi::encode(&[
                uint(0),
                uint(1),
                AbiToken::Uint(U256::MAX)
            ])),
            Err(Error::OutOfBounds)
        ));
    }
}
