//! Movement of tokens between accounts and the vault.

use {
    crate::{Account, Token},
    parking_lot::Mutex,
    primitive_types::U256,
    std::collections::HashMap,
    thiserror::Error,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum TransferError {
    #[error("INSUFFICIENT_INTERNAL_BALANCE")]
    InsufficientInternalBalance,
    #[error("INSUFFICIENT_BALANCE")]
    InsufficientBalance,
    #[error("BALANCE_TOTAL_OVERFLOW")]
    BalanceOverflow,
}

impl TransferError {
    pub fn code(&self) -> u16 {
        match self {
            Self::InsufficientInternalBalance => 513,
            Self::InsufficientBalance => 406,
            Self::BalanceOverflow => 512,
        }
    }
}

/// Where funds of an operation come from and go to.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FundManagement {
    pub sender: Account,
    /// Use the sender's internal balance before pulling external tokens.
    pub from_internal_balance: bool,
    pub recipient: Account,
    /// Credit the recipient's internal balance instead of sending tokens.
    pub to_internal_balance: bool,
}

impl FundManagement {
    /// Funds pulled from and paid to the same account's external balance.
    pub fn external(account: Account) -> Self {
        Self {
            sender: account,
            from_internal_balance: false,
            recipient: account,
            to_internal_balance: false,
        }
    }
}

/// The only way the vault moves funds.
#[mockall::automock]
pub trait AssetTransfers: Send + Sync {
    /// Pulls every `incoming` amount from the sender into the vault and pays
    /// every `outgoing` amount to the recipient. Either all of it happens or
    /// nothing does.
    fn settle(
        &self,
        funds: &FundManagement,
        incoming: &[(Token, U256)],
        outgoing: &[(Token, U256)],
    ) -> Result<(), TransferError>;
}

/// In memory token balances: external balances per account, internal
/// balances kept in the vault per account, and the reserves backing the pool
/// balances.
#[derive(Debug, Default)]
pub struct Ledger {
    balances: Mutex<Balances>,
}

#[derive(Clone, Debug, Default)]
struct Balances {
    external: HashMap<(Account, Token), U256>,
    internal: HashMap<(Account, Token), U256>,
    reserves: HashMap<Token, U256>,
}

impl Balances {
    fn credit(
        map: &mut HashMap<(Account, Token), U256>,
        key: (Account, Token),
        amount: U256,
    ) -> Result<(), TransferError> {
        let balance = map.entry(key).or_default();
        *balance = balance
            .checked_add(amount)
            .ok_or(TransferError::BalanceOverflow)?;
        Ok(())
    }

    fn debit(
        map: &mut HashMap<(Account, Token), U256>,
        key: (Account, Token),
        amount: U256,
        error: TransferError,
    ) -> Result<(), TransferError> {
        let balance = map.entry(key).or_default();
        *balance = balance.checked_sub(amount).ok_or(error)?;
        Ok(())
    }

    fn pull(
        &mut self,
        funds: &FundManagement,
        token: Token,
        amount: U256,
    ) -> Result<(), TransferError> {
        let key = (funds.sender, token);
        let mut remaining = amount;
        if funds.from_internal_balance {
            let internal = self.internal.get(&key).copied().unwrap_or_default();
            let used = internal.min(remaining);
            Self::debit(
                &mut self.internal,
                key,
                used,
                TransferError::InsufficientInternalBalance,
            )?;
            remaining -= used;
        }
        Self::debit(
            &mut self.external,
            key,
            remaining,
            TransferError::InsufficientBalance,
        )?;
        let reserve = self.reserves.entry(token).or_default();
        *reserve = reserve
            .checked_add(amount)
            .ok_or(TransferError::BalanceOverflow)?;
        Ok(())
    }

    fn push(
        &mut self,
        funds: &FundManagement,
        token: Token,
        amount: U256,
    ) -> Result<(), TransferError> {
        let reserve = self.reserves.entry(token).or_default();
        *reserve = reserve
            .checked_sub(amount)
            .ok_or(TransferError::InsufficientBalance)?;
        let key = (funds.recipient, token);
        if funds.to_internal_balance {
            Self::credit(&mut self.internal, key, amount)
        } else {
            Self::credit(&mut self.external, key, amount)
        }
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds tokens to an external balance, the way tokens enter the system.
    pub fn mint(&self, account: Account, token: Token, amount: U256) -> Result<(), TransferError> {
        Balances::credit(&mut self.balances.lock().external, (account, token), amount)
    }

    pub fn balance_of(&self, account: Account, token: Token) -> U256 {
        self.balances
            .lock()
            .external
            .get(&(account, token))
            .copied()
            .unwrap_or_default()
    }

    pub fn internal_balance_of(&self, account: Account, token: Token) -> U256 {
        self.balances
            .lock()
            .internal
            .get(&(account, token))
            .copied()
            .unwrap_or_default()
    }

    /// Tokens held by the vault on behalf of pools.
    pub fn reserves_of(&self, token: Token) -> U256 {
        self.balances
            .lock()
            .reserves
            .get(&token)
            .copied()
            .unwrap_or_default()
    }

    /// Deposits external tokens into the account's internal balance.
    pub fn credit_internal_balance(
        &self,
        account: Account,
        token: Token,
        amount: U256,
    ) -> Result<(), TransferError> {
        let mut balances = self.balances.lock();
        let mut updated = balances.clone();
        Balances::debit(
            &mut updated.external,
            (account, token),
            amount,
            TransferError::InsufficientBalance,
        )?;
        Balances::credit(&mut updated.internal, (account, token), amount)?;
        *balances = updated;
        Ok(())
    }

    /// Withdraws from the account's internal balance to its external one.
    pub fn debit_internal_balance(
        &self,
        account: Account,
        token: Token,
        amount: U256,
    ) -> Result<(), TransferError> {
        let mut balances = self.balances.lock();
        let mut updated = balances.clone();
        Balances::debit(
            &mut updated.internal,
            (account, token),
            amount,
            TransferError::InsufficientInternalBalance,
        )?;
        Balances::credit(&mut updated.external, (account, token), amount)?;
        *balances = updated;
        Ok(())
    }

    /// Moves external tokens between two accounts.
    pub fn transfer(
        &self,
        token: Token,
        from: Account,
        to: Account,
        amount: U256,
    ) -> Result<(), TransferError> {
        let mut balances = self.balances.lock();
        let mut updated = balances.clone();
        Balances::debit(
            &mut updated.external,
            (from, token),
            amount,
            TransferError::InsufficientBalance,
        )?;
        Balances::credit(&mut updated.external, (to, token), amount)?;
        *balances = updated;
        Ok(())
    }
}

impl AssetTransfers for Ledger {
    fn settle(
        &self,
        funds: &FundManagement,
        incoming: &[(Token, U256)],
        outgoing: &[(Token, U256)],
    ) -> Result<(), TransferError> {
        let mut balances = self.balances.lock();
        let mut updated = balances.clone();
        for (token, amount) in incoming {
            updated.pull(funds, *token, *amount)?;
        }
        for (token, amount) in outgoing {
            updated.push(funds, *token, *amount)?;
        }
        *balances = updated;
        Ok(())
    }
}
