use std::sync::{Mutex, MutexGuard, PoisonError};

use flightsure_types::{
    Affiliate, ApprovalOutcome, ConsortiumConfig, ConsortiumError, ConsortiumEvent,
    ConsortiumResult, Guard, InsuranceKey, InsuranceRecord, Principal, Role, SettlementRoute,
    Units,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::escrow::{EscrowLedger, PaymentEscrow};
use crate::events::{EventLog, EventRecord};
use crate::governance::GovernanceLedger;
use crate::roles::{RevocationRecord, RoleRegistry};
use crate::transfer::ValueTransfer;

/// Everything a single operation may touch.
#[derive(Debug)]
struct ConsortiumState {
    roles: RoleRegistry,
    governance: GovernanceLedger,
    escrow: EscrowLedger,
    payments: PaymentEscrow,
}

#[derive(Debug)]
struct Store {
    state: ConsortiumState,
    log: EventLog,
}

/// The consortium service: role registry, governance ledger and escrow
/// ledger behind one lock.
///
/// Every mutating call is one atomic unit. Operations run every check
/// before their first write and buffer their events, which reach the log
/// only on success, so a rejected call leaves nothing behind.
#[derive(Debug)]
pub struct ConsortiumAlliance {
    admin: Principal,
    config: ConsortiumConfig,
    store: Mutex<Store>,
}

impl ConsortiumAlliance {
    /// Create a consortium with `admin` as the genesis admin and a random
    /// insurance-key salt.
    pub fn new(admin: Principal, config: ConsortiumConfig) -> ConsortiumResult<Self> {
        Self::with_salt(admin, config, rand::random())
    }

    /// Create a consortium with a fixed insurance-key salt.
    pub fn with_salt(
        admin: Principal,
        config: ConsortiumConfig,
        salt: [u8; 32],
    ) -> ConsortiumResult<Self> {
        config.validate()?;
        let state = ConsortiumState {
            roles: RoleRegistry::with_admin(&admin),
            governance: GovernanceLedger::new(config.bootstrap_affiliates),
            escrow: EscrowLedger::new(salt),
            payments: PaymentEscrow::default(),
        };
        info!(
            admin = %admin,
            membership_fee = %config.membership_fee,
            premium_percent = config.premium_percent,
            "Consortium created"
        );
        Ok(Self {
            admin,
            config,
            store: Mutex::new(Store {
                state,
                log: EventLog::new(),
            }),
        })
    }

    pub fn genesis_admin(&self) -> &Principal {
        &self.admin
    }

    pub fn config(&self) -> &ConsortiumConfig {
        &self.config
    }

    // ── Role registry ──────────────────────────────────────────────────

    pub fn grant_role(
        &self,
        caller: &Principal,
        principal: &Principal,
        role: Role,
    ) -> ConsortiumResult<bool> {
        let granted = self.transact("grant_role", |s, events| {
            s.roles.grant(caller, principal, role, events)
        })?;
        if granted {
            info!(principal = %principal, role = %role, by = %caller, "Role granted");
        }
        Ok(granted)
    }

    pub fn revoke_role(
        &self,
        caller: &Principal,
        principal: &Principal,
        role: Role,
    ) -> ConsortiumResult<bool> {
        let revoked = self.transact("revoke_role", |s, events| {
            s.roles.revoke(caller, principal, role, events)
        })?;
        if revoked {
            info!(principal = %principal, role = %role, by = %caller, "Role revoked");
        }
        Ok(revoked)
    }

    pub fn add_delegate_role(
        &self,
        caller: &Principal,
        principal: &Principal,
    ) -> ConsortiumResult<bool> {
        self.grant_role(caller, principal, Role::Delegate)
    }

    pub fn add_admin_role(
        &self,
        caller: &Principal,
        principal: &Principal,
    ) -> ConsortiumResult<bool> {
        self.grant_role(caller, principal, Role::Admin)
    }

    pub fn has_role(&self, principal: &Principal, role: Role) -> bool {
        self.read(|s| s.roles.has_role(principal, role))
    }

    pub fn roles_of(&self, principal: &Principal) -> Vec<Role> {
        self.read(|s| s.roles.roles_of(principal))
    }

    pub fn is_admin(&self, principal: &Principal) -> bool {
        self.has_role(principal, Role::Admin)
    }

    pub fn is_delegate(&self, principal: &Principal) -> bool {
        self.has_role(principal, Role::Delegate)
    }

    /// Every role revocation so far, oldest first.
    pub fn revocation_history(&self) -> Vec<RevocationRecord> {
        self.read(|s| s.roles.revocation_history().to_vec())
    }

    // ── Governance ─────────────────────────────────────────────────────

    pub fn create_affiliate(
        &self,
        caller: &Principal,
        principal: &Principal,
        title: &str,
    ) -> ConsortiumResult<()> {
        self.transact("create_affiliate", |s, events| {
            s.roles.require_admin(caller)?;
            s.governance.require_operational()?;
            s.governance.register(principal, title, events)?;
            s.roles.insert(principal, Role::Affiliate, events);
            Ok(())
        })?;
        info!(affiliate = %principal, title = %title, "Affiliate created");
        Ok(())
    }

    /// Pay the membership fee. Returns whether the affiliate holds voting
    /// rights afterwards.
    pub fn deposit_membership(&self, caller: &Principal, value: Units) -> ConsortiumResult<bool> {
        let fee = self.config.membership_fee;
        let approved = self.transact("deposit_membership", |s, events| {
            let affiliate = s
                .governance
                .affiliate(caller)
                .ok_or_else(|| ConsortiumError::unauthorized(caller, Guard::OnlyAffiliate))?;
            if affiliate.is_funded() {
                return Err(ConsortiumError::AlreadyExists(format!(
                    "membership of {}",
                    caller
                )));
            }
            s.governance.require_operational()?;
            if value != fee {
                return Err(ConsortiumError::InsufficientValue {
                    expected: fee,
                    received: value,
                });
            }

            events.push(ConsortiumEvent::AffiliateFunded {
                affiliate: caller.clone(),
                amount: value,
            });
            s.escrow.credit_balance(value, events)?;
            s.governance.mark_funded(caller, events)
        })?;
        info!(affiliate = %caller, amount = %value, approved, "Membership funded");
        Ok(approved)
    }

    pub fn approve_affiliate(
        &self,
        caller: &Principal,
        candidate: &Principal,
    ) -> ConsortiumResult<ApprovalOutcome> {
        let outcome = self.transact("approve_affiliate", |s, events| {
            s.governance.require_approved_affiliate(caller)?;
            s.governance.require_operational()?;
            s.governance.approve(caller, candidate, events)
        })?;
        match outcome {
            ApprovalOutcome::Approved => {
                info!(candidate = %candidate, approver = %caller, "Affiliate approved")
            }
            ApprovalOutcome::Pending {
                approvals,
                required,
            } => debug!(
                candidate = %candidate,
                approver = %caller,
                approvals,
                required,
                "Affiliate approval pending"
            ),
        }
        Ok(outcome)
    }

    /// Vote to suspend. Returns the operational status after the vote.
    pub fn suspend_service(&self, caller: &Principal) -> ConsortiumResult<bool> {
        self.operational_vote(caller, true)
    }

    /// Withdraw a suspend vote. Returns the operational status after the vote.
    pub fn resume_service(&self, caller: &Principal) -> ConsortiumResult<bool> {
        self.operational_vote(caller, false)
    }

    fn operational_vote(&self, caller: &Principal, suspend: bool) -> ConsortiumResult<bool> {
        let op = if suspend { "suspend_service" } else { "resume_service" };
        let operational = self.transact(op, |s, _| {
            s.governance.cast_operational_vote(caller, suspend)
        })?;
        info!(affiliate = %caller, suspend, operational, "Operational vote recorded");
        Ok(operational)
    }

    pub fn fund_consortium(&self, caller: &Principal, value: Units) -> ConsortiumResult<()> {
        self.transact("fund_consortium", |s, events| {
            s.governance.require_consortium_affiliate(caller)?;
            s.governance.require_operational()?;
            if value == 0 {
                return Err(ConsortiumError::InsufficientValue {
                    expected: 1,
                    received: 0,
                });
            }
            s.escrow.credit_balance(value, events)
        })?;
        info!(affiliate = %caller, amount = %value, "Consortium funded");
        Ok(())
    }

    // ── Escrow ─────────────────────────────────────────────────────────

    /// Take `value` into escrow on behalf of `payer`. Returns the
    /// single-use settlement key.
    pub fn deposit_insurance(
        &self,
        caller: &Principal,
        payer: &Principal,
        value: Units,
    ) -> ConsortiumResult<InsuranceKey> {
        self.deposit_insurance_with(caller, payer, value, |_| Vec::new())
    }

    /// `deposit_insurance`, committing the events produced by `trailer`
    /// in the same unit.
    pub fn deposit_insurance_with<F>(
        &self,
        caller: &Principal,
        payer: &Principal,
        value: Units,
        trailer: F,
    ) -> ConsortiumResult<InsuranceKey>
    where
        F: FnOnce(InsuranceKey) -> Vec<ConsortiumEvent>,
    {
        let key = self.transact("deposit_insurance", |s, events| {
            s.roles.require_delegate(caller)?;
            s.governance.require_operational()?;
            let key = s.escrow.deposit(caller, payer, value, events)?;
            events.extend(trailer(key));
            Ok(key)
        })?;
        info!(key = %key.short(), payer = %payer, amount = %value, "Insurance deposited");
        Ok(key)
    }

    /// Settle in the consortium's favor. Returns the amount moved to the
    /// consortium balance.
    pub fn credit_consortium(
        &self,
        caller: &Principal,
        key: &InsuranceKey,
    ) -> ConsortiumResult<Units> {
        let amount = self.transact("credit_consortium", |s, events| {
            s.roles.require_delegate(caller)?;
            s.governance.require_operational()?;
            settle(s, &self.config, key, SettlementRoute::ToConsortium, events)
        })?;
        info!(key = %key.short(), amount = %amount, "Insurance credited to consortium");
        Ok(amount)
    }

    pub fn credit_insurance(
        &self,
        caller: &Principal,
        key: &InsuranceKey,
    ) -> ConsortiumResult<Units> {
        self.credit_consortium(caller, key)
    }

    /// Settle in the insuree's favor. Returns the payout (deposit plus
    /// premium) credited to the payer's withdrawable payments.
    pub fn credit_insuree(
        &self,
        caller: &Principal,
        key: &InsuranceKey,
    ) -> ConsortiumResult<Units> {
        let payout = self.transact("credit_insuree", |s, events| {
            s.roles.require_delegate(caller)?;
            s.governance.require_operational()?;
            settle(s, &self.config, key, SettlementRoute::ToInsuree, events)
        })?;
        info!(key = %key.short(), payout = %payout, "Insurance credited to insuree");
        Ok(payout)
    }

    pub fn withdraw_insurance(
        &self,
        caller: &Principal,
        key: &InsuranceKey,
    ) -> ConsortiumResult<Units> {
        self.credit_insuree(caller, key)
    }

    /// Settle every still-pending key along `route` in one unit. Keys that
    /// are unknown, already settled or repeated are skipped. The whole batch
    /// is checked before any key moves. Returns the settled keys.
    pub fn settle_pending(
        &self,
        caller: &Principal,
        keys: &[InsuranceKey],
        route: SettlementRoute,
    ) -> ConsortiumResult<Vec<InsuranceKey>> {
        self.settle_pending_with(caller, keys, route, Vec::new(), |_| Vec::new())
    }

    /// `settle_pending`, committing `preamble` before and the events
    /// produced by `trailer` after the settlement events, in the same unit.
    pub fn settle_pending_with<F>(
        &self,
        caller: &Principal,
        keys: &[InsuranceKey],
        route: SettlementRoute,
        preamble: Vec<ConsortiumEvent>,
        trailer: F,
    ) -> ConsortiumResult<Vec<InsuranceKey>>
    where
        F: FnOnce(&[InsuranceKey]) -> Vec<ConsortiumEvent>,
    {
        let settled = self.transact("settle_pending", |s, events| {
            s.roles.require_delegate(caller)?;
            s.governance.require_operational()?;
            let pending = s.escrow.pending_keys(keys);
            events.extend(preamble);
            settle_all(s, &self.config, &pending, route, events)?;
            events.extend(trailer(&pending));
            Ok(pending)
        })?;
        info!(
            route = ?route,
            settled = settled.len(),
            requested = keys.len(),
            "Pending insurance settled"
        );
        Ok(settled)
    }

    /// Pay out everything owed to `payee` through `transfer`.
    ///
    /// The entry is zeroed and committed before the transfer runs, with no
    /// lock held; a reentrant withdrawal sees nothing to withdraw. A failed
    /// transfer restores the entry.
    pub fn withdraw_payments(
        &self,
        payee: &Principal,
        transfer: &dyn ValueTransfer,
    ) -> ConsortiumResult<Units> {
        let amount = self.transact("withdraw_payments", |s, _| s.payments.take(payee))?;

        if let Err(err) = transfer.transfer(payee, amount) {
            warn!(
                payee = %payee,
                amount = %amount,
                error = %err,
                "Transfer failed, restoring payments"
            );
            self.transact("restore_payments", |s, _| s.payments.credit(payee, amount))?;
            return Err(ConsortiumError::Transfer {
                payee: payee.clone(),
                reason: err.to_string(),
            });
        }

        self.lock().log.append_all(vec![ConsortiumEvent::PaymentWithdrawn {
            payee: payee.clone(),
            amount,
        }]);
        info!(payee = %payee, amount = %amount, "Payments withdrawn");
        Ok(amount)
    }

    /// Commit notifications produced by a delegate-run service.
    pub fn publish(
        &self,
        caller: &Principal,
        batch: Vec<ConsortiumEvent>,
    ) -> ConsortiumResult<()> {
        self.transact("publish", |s, events| {
            s.roles.require_delegate(caller)?;
            events.extend(batch);
            Ok(())
        })
    }

    // ── Guards for delegate-run services ───────────────────────────────

    /// `OnlyOperational` guard.
    pub fn ensure_operational(&self) -> ConsortiumResult<()> {
        self.read(|s| s.governance.require_operational())
    }

    /// `OnlyConsortiumAffiliate` guard.
    pub fn ensure_consortium_affiliate(&self, caller: &Principal) -> ConsortiumResult<()> {
        self.read(|s| s.governance.require_consortium_affiliate(caller).map(|_| ()))
    }

    /// `OnlyAdmin` guard.
    pub fn ensure_admin(&self, caller: &Principal) -> ConsortiumResult<()> {
        self.read(|s| s.roles.require_admin(caller))
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn is_operational(&self) -> bool {
        self.read(|s| s.governance.is_operational())
    }

    pub fn consortium_balance(&self) -> Units {
        self.read(|s| s.escrow.balance())
    }

    pub fn consortium_escrow(&self) -> Units {
        self.read(|s| s.escrow.escrow())
    }

    pub fn custody(&self) -> Units {
        self.read(|s| s.escrow.custody())
    }

    /// `custody == balance + escrow`.
    pub fn custody_balanced(&self) -> bool {
        self.read(|s| s.escrow.invariant_holds())
    }

    pub fn payments(&self, payee: &Principal) -> Units {
        self.read(|s| s.payments.payments(payee))
    }

    pub fn payments_outstanding(&self) -> Units {
        self.read(|s| s.payments.total())
    }

    pub fn affiliate(&self, principal: &Principal) -> Option<Affiliate> {
        self.read(|s| s.governance.affiliate(principal).cloned())
    }

    pub fn affiliates(&self) -> Vec<Affiliate> {
        self.read(|s| s.governance.affiliates().cloned().collect())
    }

    pub fn funded_count(&self) -> usize {
        self.read(|s| s.governance.funded_count())
    }

    pub fn insurance(&self, key: &InsuranceKey) -> Option<InsuranceRecord> {
        self.read(|s| s.escrow.record(key).cloned())
    }

    pub fn pending_insurance_count(&self) -> usize {
        self.read(|s| s.escrow.pending_count())
    }

    // ── Events ─────────────────────────────────────────────────────────

    pub fn event_count(&self) -> usize {
        self.lock().log.len()
    }

    pub fn events_since(&self, sequence: u64) -> Vec<EventRecord> {
        self.lock().log.since(sequence)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.lock().log.subscribe()
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, Store> {
        // Writes follow all checks and never panic, so a poisoned store is consistent
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<T>(&self, f: impl FnOnce(&ConsortiumState) -> T) -> T {
        f(&self.lock().state)
    }

    fn transact<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut ConsortiumState, &mut Vec<ConsortiumEvent>) -> ConsortiumResult<T>,
    ) -> ConsortiumResult<T> {
        let mut guard = self.lock();
        let store = &mut *guard;
        let mut events = Vec::new();
        match f(&mut store.state, &mut events) {
            Ok(value) => {
                debug_assert!(store.state.escrow.invariant_holds());
                store.log.append_all(events);
                Ok(value)
            }
            Err(err) => {
                warn!(op, error = %err, "Operation rejected");
                Err(err)
            }
        }
    }
}

/// Move one pending record along `route`. Returns the amount credited to
/// the consortium or the payout credited to the insuree.
fn settle(
    s: &mut ConsortiumState,
    config: &ConsortiumConfig,
    key: &InsuranceKey,
    route: SettlementRoute,
    events: &mut Vec<ConsortiumEvent>,
) -> ConsortiumResult<Units> {
    if s.escrow.pending_keys(std::slice::from_ref(key)).is_empty() {
        return Err(ConsortiumError::InvalidKey(*key));
    }
    let amounts = settle_all(s, config, std::slice::from_ref(key), route, events)?;
    amounts
        .first()
        .copied()
        .ok_or(ConsortiumError::InvalidKey(*key))
}

/// Move distinct pending records along `route`, in order. The batch is
/// checked against balance and payments before the first record moves.
fn settle_all(
    s: &mut ConsortiumState,
    config: &ConsortiumConfig,
    keys: &[InsuranceKey],
    route: SettlementRoute,
    events: &mut Vec<ConsortiumEvent>,
) -> ConsortiumResult<Vec<Units>> {
    if route == SettlementRoute::ToInsuree {
        let owed = s
            .escrow
            .check_insuree_settlements(keys, |amount| config.premium_for(amount))?;
        s.payments.check_credits(&owed)?;
    }

    let mut amounts = Vec::with_capacity(keys.len());
    for key in keys {
        let amount = match route {
            SettlementRoute::ToConsortium => s.escrow.settle_to_consortium(key, events)?,
            SettlementRoute::ToInsuree => {
                let amount = s
                    .escrow
                    .record(key)
                    .ok_or(ConsortiumError::InvalidKey(*key))?
                    .amount;
                let premium = config.premium_for(amount)?;
                let (payer, payout) = s.escrow.settle_to_insuree(key, premium, events)?;
                s.payments.credit(&payer, payout)?;
                payout
            }
        };
        amounts.push(amount);
    }
    Ok(amounts)
}
