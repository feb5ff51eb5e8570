use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use flightsure_types::{
    ConsortiumError, ConsortiumEvent, ConsortiumResult, InsuranceKey, InsuranceRecord,
    InsuranceState, Principal, Units,
};
use tracing::debug;

/// Escrow Ledger: custody of consortium funds.
///
/// Funds are split into the spendable `balance` and the `escrow` held for
/// pending insurance. `custody` is the total value held by the consortium and
/// always equals `balance + escrow`.
///
/// Every mutating method computes its new totals before writing any of them,
/// so a rejected call leaves the ledger untouched.
#[derive(Clone, Debug)]
pub struct EscrowLedger {
    balance: Units,
    escrow: Units,
    custody: Units,
    records: HashMap<InsuranceKey, InsuranceRecord>,
    /// Monotonic counter mixed into every insurance key
    nonce: u64,
    /// Per-instance secret making keys unguessable
    salt: [u8; 32],
}

impl EscrowLedger {
    pub fn new(salt: [u8; 32]) -> Self {
        Self {
            balance: 0,
            escrow: 0,
            custody: 0,
            records: HashMap::new(),
            nonce: 0,
            salt,
        }
    }

    pub fn balance(&self) -> Units {
        self.balance
    }

    pub fn escrow(&self) -> Units {
        self.escrow
    }

    pub fn custody(&self) -> Units {
        self.custody
    }

    pub fn record(&self, key: &InsuranceKey) -> Option<&InsuranceRecord> {
        self.records.get(key)
    }

    pub fn pending_count(&self) -> usize {
        self.records.values().filter(|r| r.is_pending()).count()
    }

    pub fn invariant_holds(&self) -> bool {
        self.balance.checked_add(self.escrow) == Some(self.custody)
    }

    /// Take `amount` into custody as spendable consortium funds.
    pub fn credit_balance(
        &mut self,
        amount: Units,
        events: &mut Vec<ConsortiumEvent>,
    ) -> ConsortiumResult<()> {
        let custody = add(self.custody, amount, "custody")?;
        let balance = add(self.balance, amount, "balance")?;
        self.custody = custody;
        self.balance = balance;
        events.push(ConsortiumEvent::ConsortiumCredited {
            amount,
            balance: self.balance,
        });
        Ok(())
    }

    /// Take `amount` into escrow under a fresh Pending record.
    pub fn deposit(
        &mut self,
        caller: &Principal,
        payer: &Principal,
        amount: Units,
        events: &mut Vec<ConsortiumEvent>,
    ) -> ConsortiumResult<InsuranceKey> {
        if amount == 0 {
            return Err(ConsortiumError::InsufficientValue {
                expected: 1,
                received: 0,
            });
        }
        let custody = add(self.custody, amount, "custody")?;
        let escrow = add(self.escrow, amount, "escrow")?;
        let nonce = self.nonce + 1;
        let key = self.derive_key(caller, payer, amount, nonce);

        self.nonce = nonce;
        self.custody = custody;
        self.escrow = escrow;
        self.records.insert(
            key,
            InsuranceRecord {
                key,
                payer: payer.clone(),
                amount,
                state: InsuranceState::Pending,
                deposited_at: Utc::now(),
                settled_at: None,
            },
        );

        debug!(
            key = %key.short(),
            payer = %payer,
            amount = %amount,
            "Insurance deposited to escrow"
        );
        events.push(ConsortiumEvent::InsuranceRegistered {
            key,
            payer: payer.clone(),
            amount,
        });
        events.push(ConsortiumEvent::EscrowCredited {
            amount,
            escrow: self.escrow,
        });
        Ok(key)
    }

    /// Airline not liable: the whole deposit moves from escrow to balance.
    pub fn settle_to_consortium(
        &mut self,
        key: &InsuranceKey,
        events: &mut Vec<ConsortiumEvent>,
    ) -> ConsortiumResult<Units> {
        let amount = self.pending(key)?.amount;
        let escrow = sub(self.escrow, amount, "escrow")?;
        let balance = add(self.balance, amount, "balance")?;

        self.escrow = escrow;
        self.balance = balance;
        self.mark(key, InsuranceState::SettledToConsortium);

        debug!(key = %key.short(), amount = %amount, "Insurance settled to consortium");
        events.push(ConsortiumEvent::ConsortiumCredited {
            amount,
            balance: self.balance,
        });
        events.push(ConsortiumEvent::EscrowDebited {
            amount,
            escrow: self.escrow,
        });
        Ok(amount)
    }

    /// Airline liable: the deposit leaves escrow and the consortium pays
    /// `premium` out of its balance. Returns the payer and the total owed
    /// (`amount + premium`); crediting it is the caller's job.
    pub fn settle_to_insuree(
        &mut self,
        key: &InsuranceKey,
        premium: Units,
        events: &mut Vec<ConsortiumEvent>,
    ) -> ConsortiumResult<(Principal, Units)> {
        let record = self.pending(key)?;
        let amount = record.amount;
        let payer = record.payer.clone();

        if self.balance < premium {
            return Err(ConsortiumError::InsufficientFunds {
                required: premium,
                available: self.balance,
            });
        }
        let payout = add(amount, premium, "payout")?;
        let balance = sub(self.balance, premium, "balance")?;
        let escrow = sub(self.escrow, amount, "escrow")?;
        let custody = sub(self.custody, payout, "custody")?;

        self.balance = balance;
        self.escrow = escrow;
        self.custody = custody;
        self.mark(key, InsuranceState::SettledToInsuree);

        debug!(
            key = %key.short(),
            payer = %payer,
            amount = %amount,
            premium = %premium,
            "Insurance settled to insuree"
        );
        events.push(ConsortiumEvent::ConsortiumDebited {
            amount: premium,
            balance: self.balance,
        });
        events.push(ConsortiumEvent::EscrowDebited {
            amount,
            escrow: self.escrow,
        });
        events.push(ConsortiumEvent::InsureeCredited {
            key: *key,
            payer: payer.clone(),
            amount: payout,
        });
        Ok((payer, payout))
    }

    /// The still-pending keys among `keys`, in order and without repeats.
    pub fn pending_keys(&self, keys: &[InsuranceKey]) -> Vec<InsuranceKey> {
        let mut seen = HashSet::new();
        keys.iter()
            .filter(|key| {
                let pending = self.record(key).is_some_and(|r| r.is_pending());
                if !pending {
                    debug!(key = %key.short(), "Skipping settled or unknown key");
                }
                pending && seen.insert(**key)
            })
            .copied()
            .collect()
    }

    /// Check that settling every key of `keys` to its insuree, in order,
    /// would succeed. Returns what each payer would be owed. `keys` must be
    /// pending and distinct, as returned by [`Self::pending_keys`].
    pub fn check_insuree_settlements(
        &self,
        keys: &[InsuranceKey],
        premium_for: impl Fn(Units) -> ConsortiumResult<Units>,
    ) -> ConsortiumResult<BTreeMap<Principal, Units>> {
        let mut balance = self.balance;
        let mut owed: BTreeMap<Principal, Units> = BTreeMap::new();
        for key in keys {
            let record = self.pending(key)?;
            let premium = premium_for(record.amount)?;
            if balance < premium {
                return Err(ConsortiumError::InsufficientFunds {
                    required: premium,
                    available: balance,
                });
            }
            balance -= premium;
            let payout = add(record.amount, premium, "payout")?;
            let entry = owed.entry(record.payer.clone()).or_insert(0);
            *entry = add(*entry, payout, "payout")?;
        }
        Ok(owed)
    }

    /// Single-use guard: only a Pending record may be settled.
    fn pending(&self, key: &InsuranceKey) -> ConsortiumResult<&InsuranceRecord> {
        self.records
            .get(key)
            .filter(|r| r.is_pending())
            .ok_or(ConsortiumError::InvalidKey(*key))
    }

    fn mark(&mut self, key: &InsuranceKey, state: InsuranceState) {
        if let Some(record) = self.records.get_mut(key) {
            record.state = state;
            record.settled_at = Some(Utc::now());
        }
    }

    fn derive_key(
        &self,
        caller: &Principal,
        payer: &Principal,
        amount: Units,
        nonce: u64,
    ) -> InsuranceKey {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"flightsure-insurance-v1:");
        hasher.update(&self.salt);
        hasher.update(&(caller.0.len() as u32).to_le_bytes());
        hasher.update(caller.0.as_bytes());
        hasher.update(&(payer.0.len() as u32).to_le_bytes());
        hasher.update(payer.0.as_bytes());
        hasher.update(&amount.to_le_bytes());
        hasher.update(&nonce.to_le_bytes());
        InsuranceKey::from(hasher.finalize())
    }
}

/// Pull-payment ledger: amounts owed to insurees, held outside consortium
/// custody until withdrawn.
#[derive(Clone, Debug, Default)]
pub struct PaymentEscrow {
    deposits: BTreeMap<Principal, Units>,
    total: Units,
}

impl PaymentEscrow {
    pub fn payments(&self, payee: &Principal) -> Units {
        self.deposits.get(payee).copied().unwrap_or(0)
    }

    pub fn total(&self) -> Units {
        self.total
    }

    pub fn credit(&mut self, payee: &Principal, amount: Units) -> ConsortiumResult<()> {
        let entry = add(self.payments(payee), amount, "payments")?;
        let total = add(self.total, amount, "payments total")?;
        self.deposits.insert(payee.clone(), entry);
        self.total = total;
        Ok(())
    }

    /// Check that every credit of `credits` would fit.
    pub fn check_credits(&self, credits: &BTreeMap<Principal, Units>) -> ConsortiumResult<()> {
        let mut total = self.total;
        for (payee, amount) in credits {
            add(self.payments(payee), *amount, "payments")?;
            total = add(total, *amount, "payments total")?;
        }
        Ok(())
    }

    /// Read and zero the payee's entry.
    pub fn take(&mut self, payee: &Principal) -> ConsortiumResult<Units> {
        let amount = self.payments(payee);
        if amount == 0 {
            return Err(ConsortiumError::NothingToWithdraw(payee.clone()));
        }
        let total = sub(self.total, amount, "payments total")?;
        self.deposits.remove(payee);
        self.total = total;
        Ok(amount)
    }
}

fn add(a: Units, b: Units, what: &'static str) -> ConsortiumResult<Units> {
    a.checked_add(b).ok_or(ConsortiumError::Arithmetic(what))
}

fn sub(a: Units, b: Units, what: &'static str) -> ConsortiumResult<Units> {
    a.checked_sub(b).ok_or(ConsortiumError::Arithmetic(what))
}
