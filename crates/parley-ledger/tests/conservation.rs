//! Ledger conservation properties
//!
//! For any sequence of settlements, the sum of balances equals the sum of
//! funding; failed and replayed settlements change nothing.

use chrono::Utc;
use parley_ledger::{CommitMode, InMemoryStore, LedgerStore, LedgerUnit, TransferIntent};
use parley_types::{AgentId, Amount, CommitKind, SessionId, SettlementStatus};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct Step {
    from: usize,
    to: usize,
    amount: u64,
    replay: bool,
}

fn step(agents: usize) -> impl Strategy<Value = Step> {
    (0..agents, 0..agents, 1u64..200, any::<bool>()).prop_map(|(from, to, amount, replay)| Step {
        from,
        to,
        amount,
        replay,
    })
}

fn run(funding: Vec<u64>, steps: Vec<Step>) -> (u128, u128, Vec<Amount>) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    rt.block_on(async move {
        let store = InMemoryStore::new();
        let agents: Vec<AgentId> = funding.iter().map(|_| AgentId::new()).collect();
        let mut minted: u128 = 0;
        for (agent, amount) in agents.iter().zip(&funding) {
            if *amount > 0 {
                store.fund(agent, Amount::new(*amount), Utc::now()).await.unwrap();
                minted += *amount as u128;
            }
        }

        let mut last: Option<LedgerUnit> = None;
        for s in steps {
            if s.from == s.to {
                continue;
            }
            let unit = match (&last, s.replay) {
                (Some(prev), true) => prev.clone(),
                _ => LedgerUnit {
                    session_id: SessionId::new(),
                    kind: CommitKind::Acceptance,
                    transfer: Some(TransferIntent {
                        from: agents[s.from],
                        to: agents[s.to],
                        amount: Amount::new(s.amount),
                    }),
                    influence: vec![],
                    at: Utc::now(),
                },
            };
            store.commit(unit.clone(), CommitMode::FirstAttempt).await.unwrap();
            last = Some(unit);
        }

        let mut balances = Vec::new();
        for agent in &agents {
            balances.push(store.balance(agent).await.unwrap());
        }
        (minted, store.total_balance().await.unwrap(), balances)
    })
}

proptest! {
    #[test]
    fn settlements_conserve_value(
        funding in prop::collection::vec(0u64..500, 2..6),
        steps in prop::collection::vec(step(6), 0..40),
    ) {
        let agents = funding.len();
        let steps: Vec<Step> = steps
            .into_iter()
            .map(|s| Step { from: s.from % agents, to: s.to % agents, ..s })
            .collect();

        let (minted, total, balances) = run(funding, steps);
        prop_assert_eq!(minted, total);
        prop_assert_eq!(balances.iter().map(|b| b.0 as u128).sum::<u128>(), total);
    }
}

#[tokio::test]
async fn failed_settlement_leaves_balances_untouched() {
    let store = InMemoryStore::new();
    let (a, b) = (AgentId::new(), AgentId::new());
    store.fund(&b, Amount::new(10), Utc::now()).await.unwrap();

    let outcome = store
        .commit(
            LedgerUnit {
                session_id: SessionId::new(),
                kind: CommitKind::Acceptance,
                transfer: Some(TransferIntent {
                    from: a,
                    to: b,
                    amount: Amount::new(50),
                }),
                influence: vec![],
                at: Utc::now(),
            },
            CommitMode::FirstAttempt,
        )
        .await
        .unwrap();

    assert_eq!(outcome.record.status, SettlementStatus::Failed);
    assert_eq!(store.balance(&a).await.unwrap(), Amount::zero());
    assert_eq!(store.balance(&b).await.unwrap(), Amount::new(10));
    assert_eq!(store.total_balance().await.unwrap(), 10);
}
