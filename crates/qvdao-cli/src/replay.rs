//! Apply a script to a fresh ledger and report what happened.

use serde::Serialize;

use crate::config::LedgerConfig;
use crate::script::{Op, Script, Step};
use qvdao_governance::{
    CustodyPayout, EventRecord, GovernanceError, GovernanceLedger, Member, Proposal,
    ProposalDraft, TreasuryTransaction, Vault,
};
use qvdao_types::{Address, Amount, Timestamp};

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Ok { detail: String },
    Rejected { kind: String, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub at: Timestamp,
    pub caller: Address,
    pub op: &'static str,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreasuryReport {
    pub balance: Amount,
    pub escrowed_deposits: Amount,
    pub history: Vec<TreasuryTransaction>,
}

/// Everything a replay produced.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub steps: Vec<StepReport>,
    pub owner: Address,
    pub total_weight: u128,
    pub members: Vec<Member>,
    pub proposals: Vec<Proposal>,
    pub treasury: TreasuryReport,
    pub events: Vec<EventRecord>,
}

impl Report {
    pub fn rejected(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, Outcome::Rejected { .. }))
            .count()
    }
}

/// Build a ledger from `config` and run every step of `script` on it.
///
/// Rejected steps are recorded and replay continues.
pub fn replay(config: &LedgerConfig, script: &Script) -> anyhow::Result<Report> {
    let mut ledger = config.build_ledger()?;
    let mut steps = Vec::with_capacity(script.steps.len());

    for (index, step) in script.steps.iter().enumerate() {
        let outcome = match apply(&mut ledger, step) {
            Ok(detail) => {
                tracing::info!("Step {} {} by {}: {}", index, step.op.name(), step.caller.short(), detail);
                Outcome::Ok { detail }
            }
            Err(e) => {
                tracing::warn!("Step {} {} by {} rejected: {}", index, step.op.name(), step.caller.short(), e);
                Outcome::Rejected {
                    kind: format!("{:?}", e.kind()),
                    error: e.to_string(),
                }
            }
        };
        steps.push(StepReport {
            index,
            at: step.at,
            caller: step.caller,
            op: step.op.name(),
            outcome,
        });
    }

    Ok(Report {
        steps,
        owner: ledger.owner(),
        total_weight: ledger.total_weight(),
        members: ledger.members().cloned().collect(),
        proposals: ledger.list_proposals(None).into_iter().cloned().collect(),
        treasury: TreasuryReport {
            balance: ledger.treasury_balance(),
            escrowed_deposits: ledger.escrowed_deposits(),
            history: ledger.treasury().history().to_vec(),
        },
        events: ledger.events().to_vec(),
    })
}

fn apply(ledger: &mut GovernanceLedger<Vault>, step: &Step) -> Result<String, GovernanceError> {
    let (caller, now) = (step.caller, step.at);

    match &step.op {
        Op::Stake { amount } => ledger
            .stake(caller, Amount::from(*amount), now)
            .map(|w| format!("weight {}", w)),
        Op::Unstake { amount } => ledger
            .unstake(caller, Amount::from(*amount), now)
            .map(|w| format!("weight {}", w)),
        Op::Delegate { to, expires_at } => ledger
            .set_delegate(caller, *to, *expires_at, now)
            .map(|w| format!("moved weight {}", w)),
        Op::Undelegate => ledger
            .undelegate(caller, now)
            .map(|w| format!("returned weight {}", w)),
        Op::CreateProposal {
            description,
            voting_period,
            deposit,
            transfer_to,
            transfer_amount,
        } => {
            let mut draft = ProposalDraft::new(description.clone(), *voting_period)
                .with_deposit(Amount::from(*deposit));
            if let Some(recipient) = transfer_to {
                draft = draft.with_transfer(*recipient, Amount::from(*transfer_amount));
            }
            ledger
                .create_proposal(caller, draft, now)
                .map(|id| format!("proposal #{}", id))
        }
        Op::CancelProposal { proposal } => ledger
            .cancel_proposal(caller, *proposal, now)
            .map(|_| format!("proposal #{} canceled", proposal)),
        Op::Vote {
            proposal,
            support,
            credits,
        } => ledger
            .vote(caller, *proposal, *support, u128::from(*credits), now)
            .map(|w| format!("applied weight {}", w)),
        Op::Finalize { proposal } => ledger
            .finalize_proposal(*proposal, now)
            .map(|state| format!("proposal #{} {:?}", proposal, state)),
        Op::Execute { proposal } => ledger
            .execute_proposal(caller, *proposal, &mut CustodyPayout, now)
            .map(|_| format!("proposal #{} executed", proposal)),
        Op::FundTreasury { amount } => ledger
            .fund_treasury(caller, Amount::from(*amount), now)
            .map(|_| format!("treasury {}", ledger.treasury_balance())),
        Op::UpdateProposalThreshold { threshold } => ledger
            .update_proposal_threshold(caller, *threshold, now)
            .map(|_| format!("threshold {}", threshold)),
        Op::UpdateQuorumPercentage { percent } => ledger
            .update_quorum_percentage(caller, *percent, now)
            .map(|_| format!("quorum {}%", percent)),
        Op::TransferOwnership { new_owner } => ledger
            .transfer_ownership(caller, *new_owner, now)
            .map(|_| format!("pending owner {}", new_owner.short())),
        Op::AcceptOwnership => ledger
            .accept_ownership(caller, now)
            .map(|_| "ownership accepted".to_string()),
        Op::Settle => ledger.settle(now).map(|_| "settled".to_string()),
    }
}

/// Plain-text summary for terminals.
pub fn render(report: &Report) -> String {
    let mut out = String::new();

    for step in &report.steps {
        let line = match &step.outcome {
            Outcome::Ok { detail } => format!("ok    {}", detail),
            Outcome::Rejected { error, .. } => format!("ERROR {}", error),
        };
        out.push_str(&format!(
            "[{:>3}] t={:<8} {:<12} {:<26} {}\n",
            step.index,
            step.at,
            step.caller.short(),
            step.op,
            line
        ));
    }

    out.push_str(&format!(
        "\n{} members, total weight {}, treasury {}, {} events, {} rejected steps\n",
        report.members.len(),
        report.total_weight,
        report.treasury.balance,
        report.events.len(),
        report.rejected()
    ));
    for proposal in &report.proposals {
        out.push_str(&format!(
            "proposal #{} {:?}: for {} against {} ({})\n",
            proposal.id,
            proposal.state,
            proposal.for_weight,
            proposal.against_weight,
            proposal.description
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use qvdao_governance::{GovernanceEvent, ProposalState, QuorumRule};

    fn config() -> LedgerConfig {
        let mut config = LedgerConfig::default();
        config.governance.quorum = QuorumRule::Absolute(6);
        config.treasury_seed = 1_000;
        config.balances.push(crate::config::BalanceConfig {
            address: Address::from_label("carol"),
            amount: 10_000,
        });
        config
    }

    const SCRIPT: &str = r#"
[[step]]
at = 0
caller = "label:alice"
op = { type = "stake", amount = 150 }

[[step]]
at = 0
caller = "label:bob"
op = { type = "stake", amount = 100 }

[[step]]
at = 0
caller = "label:carol"
op = { type = "stake", amount = 100 }

[[step]]
at = 1
caller = "label:alice"
op = { type = "create_proposal", description = "grant", voting_period = 3600, transfer_to = "label:erin", transfer_amount = 400 }

[[step]]
at = 2
caller = "label:bob"
op = { type = "vote", proposal = 1, support = "for", credits = 3 }

[[step]]
at = 2
caller = "label:carol"
op = { type = "vote", proposal = 1, support = "for", credits = 4 }

[[step]]
at = 2
caller = "label:carol"
op = { type = "vote", proposal = 1, support = "for", credits = 3 }

[[step]]
at = 3602
caller = "label:anyone"
op = { type = "finalize", proposal = 1 }

[[step]]
at = 3603
caller = "label:anyone"
op = { type = "execute", proposal = 1 }
"#;

    #[test]
    fn test_replay_full_lifecycle() {
        let script = Script::parse(SCRIPT).unwrap();
        let report = replay(&config(), &script).unwrap();

        assert_eq!(report.steps.len(), 9);
        assert_eq!(report.rejected(), 1);
        assert!(matches!(
            &report.steps[5].outcome,
            Outcome::Rejected { kind, .. } if kind == "Resource"
        ));

        assert_eq!(report.proposals.len(), 1);
        assert_eq!(report.proposals[0].state, ProposalState::Executed);
        assert_eq!(report.treasury.balance, 600);
        assert_eq!(report.members.len(), 3);
        assert!(matches!(
            report.events.last().map(|r| &r.event),
            Some(GovernanceEvent::ProposalExecuted { id: 1, .. })
        ));
    }

    #[test]
    fn test_report_serializes() {
        let script = Script::parse(SCRIPT).unwrap();
        let report = replay(&config(), &script).unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["steps"][0]["outcome"]["status"], "ok");
        assert_eq!(json["steps"][5]["outcome"]["status"], "rejected");
        assert_eq!(json["proposals"][0]["id"], 1);

        let text = render(&report);
        assert!(text.contains("1 rejected steps"));
    }
}
