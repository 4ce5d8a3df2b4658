//! Replay scripts.
//!
//! A script is a TOML file of `[[step]]` tables. Each step names the time it
//! happens at, the caller, and one ledger operation:
//!
//! ```toml
//! [[step]]
//! at = 10
//! caller = "label:alice"
//! op = { type = "vote", proposal = 1, support = "for", credits = 3 }
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use qvdao_governance::VoteSupport;
use qvdao_types::{Address, ProposalId, Timestamp};

/// A whole script.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Script {
    #[serde(rename = "step", default)]
    pub steps: Vec<Step>,
}

impl Script {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading script {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("parsing script {}", path.display()))
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        let script: Script = toml::from_str(contents)?;
        script.validate()?;
        Ok(script)
    }

    /// Steps must not go back in time.
    pub fn validate(&self) -> anyhow::Result<()> {
        for pair in self.steps.windows(2) {
            if pair[1].at < pair[0].at {
                anyhow::bail!(
                    "Step at {} comes after step at {}; time must not decrease",
                    pair[1].at,
                    pair[0].at
                );
            }
        }
        Ok(())
    }
}

/// One ledger operation at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub at: Timestamp,
    pub caller: Address,
    pub op: Op,
}

/// Ledger operations a script can perform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Op {
    Stake {
        amount: u64,
    },
    Unstake {
        amount: u64,
    },
    Delegate {
        to: Address,
        #[serde(default)]
        expires_at: Option<Timestamp>,
    },
    Undelegate,
    CreateProposal {
        description: String,
        voting_period: u64,
        #[serde(default)]
        deposit: u64,
        #[serde(default)]
        transfer_to: Option<Address>,
        #[serde(default)]
        transfer_amount: u64,
    },
    CancelProposal {
        proposal: ProposalId,
    },
    Vote {
        proposal: ProposalId,
        support: VoteSupport,
        credits: u64,
    },
    Finalize {
        proposal: ProposalId,
    },
    Execute {
        proposal: ProposalId,
    },
    FundTreasury {
        amount: u64,
    },
    UpdateProposalThreshold {
        threshold: u64,
    },
    UpdateQuorumPercentage {
        percent: u8,
    },
    TransferOwnership {
        new_owner: Address,
    },
    AcceptOwnership,
    Settle,
}

impl Op {
    /// Operation name as used in reports.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Stake { .. } => "stake",
            Op::Unstake { .. } => "unstake",
            Op::Delegate { .. } => "delegate",
            Op::Undelegate => "undelegate",
            Op::CreateProposal { .. } => "create_proposal",
            Op::CancelProposal { .. } => "cancel_proposal",
            Op::Vote { .. } => "vote",
            Op::Finalize { .. } => "finalize",
            Op::Execute { .. } => "execute",
            Op::FundTreasury { .. } => "fund_treasury",
            Op::UpdateProposalThreshold { .. } => "update_proposal_threshold",
            Op::UpdateQuorumPercentage { .. } => "update_quorum_percentage",
            Op::TransferOwnership { .. } => "transfer_ownership",
            Op::AcceptOwnership => "accept_ownership",
            Op::Settle => "settle",
        }
    }
}
