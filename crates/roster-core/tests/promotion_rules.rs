//! Promotion gating over arbitrary agents

use proptest::prelude::*;
use roster_core::promotion::{self, PromotionRule, RankTable};
use roster_core::{Agent, ExperienceComponents, RosterError};

fn arb_agent() -> impl Strategy<Value = Agent> {
    (
        prop::sample::select(vec!["RECLUTA", "Activo", "consagrado", "REFERENTE", "LÍDER", "Lider"]),
        0u32..2_000,
        0u32..2_000,
        0u32..2_000,
        0u32..30,
    )
        .prop_map(|(rank, b, p, l, certs)| {
            Agent::new("V-1", "Ana")
                .with_rank(rank)
                .with_experience(ExperienceComponents::new(b, p, l))
                .with_certificates(certs)
        })
}

proptest! {
    #[test]
    fn promotion_succeeds_exactly_when_eligible(agent in arb_agent()) {
        let table = RankTable::default();
        let before = promotion::progress(&agent, &table);
        let mut candidate = agent.clone();
        let result = promotion::promote(&mut candidate, &table, 1_700_000_000_000);

        if before.is_eligible() {
            let record = result.unwrap();
            prop_assert_eq!(Some(record.to.clone()), before.next_rank);
            prop_assert_eq!(candidate.rank, record.to);
            prop_assert_eq!(record.xp, agent.experience_total());
        } else {
            let rejected = matches!(result, Err(RosterError::PromotionRejected { .. }));
            prop_assert!(rejected);
            prop_assert_eq!(candidate, agent);
        }
    }

    #[test]
    fn progress_is_bounded(agent in arb_agent()) {
        let status = promotion::progress(&agent, &RankTable::default());
        prop_assert!((0.0..=100.0).contains(&status.xp_progress_pct));
        prop_assert!((0.0..=100.0).contains(&status.cert_progress_pct));
        prop_assert_eq!(status.missing_xp == 0, status.xp_met);
        prop_assert_eq!(status.missing_certificates == 0, status.cert_met);
    }
}

#[test]
fn custom_ladder_replaces_the_default() {
    let table = RankTable::empty().with_rule("NOVATO", PromotionRule::new(10, 0, "VETERANO"));
    let mut agent = Agent::new("V-1", "Ana")
        .with_rank("novato")
        .with_experience(ExperienceComponents::new(10, 0, 0));
    let record = promotion::promote(&mut agent, &table, 0).unwrap();
    assert_eq!(record.to, "VETERANO");
    assert!(promotion::progress(&agent, &table).is_max_rank());
}
