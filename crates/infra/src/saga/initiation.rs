//! Money movement initiation: opens a transaction and places its holds.

use forgepay_core::{DomainError, DomainResult, TransactionId};
use forgepay_transactions::{
    PotentialActions, Transaction, TransactionAttributes, TransactionStatus, TransactionType,
};
use tracing::{error, info, warn};

use crate::services::{AccountLedger, TransactionMachine};

#[derive(Clone)]
pub struct MoneyMovement {
    ledger: AccountLedger,
    transactions: TransactionMachine,
}

impl MoneyMovement {
    pub fn new(ledger: AccountLedger, transactions: TransactionMachine) -> Self {
        Self {
            ledger,
            transactions,
        }
    }

    /// Start a transaction of `type_of` and place its holds.
    ///
    /// The transaction is recorded before any hold. If a hold is rejected the
    /// transaction is canceled, so it can never be confirmed and its export
    /// voids whatever was placed. The hold error is returned.
    pub async fn start(
        &self,
        type_of: TransactionType,
        attributes: TransactionAttributes,
    ) -> DomainResult<Transaction> {
        attributes.object.validate_for(type_of)?;

        let transaction = self.transactions.start(type_of, attributes).await?;
        if let Err(err) = self.place_holds(&transaction).await {
            warn!(
                transaction_id = %transaction.id,
                error = %err,
                "hold rejected, canceling transaction"
            );
            if let Err(cancel_err) = self.transactions.cancel(type_of, &transaction.id).await {
                error!(
                    transaction_id = %transaction.id,
                    error = %cancel_err,
                    "failed to cancel transaction after rejected hold"
                );
            }
            return Err(err);
        }

        info!(
            transaction_id = %transaction.id,
            type_of = %type_of,
            amount = transaction.object.amount,
            "money movement started"
        );
        Ok(transaction)
    }

    async fn place_holds(&self, transaction: &Transaction) -> DomainResult<()> {
        let reference = transaction.reference();
        let amount = transaction.object.amount;
        let (from, to) = transaction.settlement_accounts()?;

        if let Some(from) = from {
            self.ledger.authorize_amount(from, amount, reference).await?;
        }
        if let Some(to) = to {
            self.ledger.start_transaction(to, amount, reference).await?;
        }
        Ok(())
    }

    /// Whether every account the transaction settles against still carries
    /// its hold.
    async fn holds_in_place(&self, transaction: &Transaction) -> DomainResult<bool> {
        let (from, to) = transaction.settlement_accounts()?;
        for account_number in [from, to].into_iter().flatten() {
            match self.ledger.find_by_account_number(account_number).await {
                Ok(account) if account.has_hold(&transaction.id) => {}
                Ok(_) | Err(DomainError::NotFound { .. }) => return Ok(false),
                Err(err) => return Err(err),
            }
        }
        Ok(true)
    }

    pub async fn start_deposit(&self, attributes: TransactionAttributes) -> DomainResult<Transaction> {
        self.start(TransactionType::Deposit, attributes).await
    }

    pub async fn start_withdraw(&self, attributes: TransactionAttributes) -> DomainResult<Transaction> {
        self.start(TransactionType::Withdraw, attributes).await
    }

    pub async fn start_transfer(&self, attributes: TransactionAttributes) -> DomainResult<Transaction> {
        self.start(TransactionType::Transfer, attributes).await
    }

    /// Confirm the transaction, recording the money-transfer action that the
    /// exporter will later enqueue.
    ///
    /// An `InProgress` transaction is only confirmed while all of its holds
    /// are in place.
    pub async fn confirm(
        &self,
        type_of: TransactionType,
        id: &TransactionId,
    ) -> DomainResult<Transaction> {
        let transaction = self.transactions.find_by_id(type_of, id).await?;
        if transaction.status == TransactionStatus::InProgress
            && !self.holds_in_place(&transaction).await?
        {
            return Err(DomainError::argument("id", "Transaction holds are missing"));
        }
        let money_transfer = transaction.money_transfer_action()?;
        self.transactions
            .confirm(
                type_of,
                id,
                serde_json::json!({}),
                Some(PotentialActions { money_transfer }),
            )
            .await
    }

    pub async fn cancel(
        &self,
        type_of: TransactionType,
        id: &TransactionId,
    ) -> DomainResult<Transaction> {
        self.transactions.cancel(type_of, id).await
    }
}
