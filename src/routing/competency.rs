//! Cascading manager eligibility rules.
//!
//! Hard rules (office, VIP gating, DataChange seniority) always narrow
//! the pool; language gating is soft — when no manager at the office
//! speaks the ticket language, the prior pool is kept rather than
//! emptied, so the ticket still lands on a human.

use tracing::debug;

use crate::domain::{Language, Manager, Position, Skill};

use super::TicketProfile;

/// Apply the eligibility cascade for one office. Pure over its inputs;
/// the returned list may be empty.
pub fn filter_eligible_managers<'a>(
    profile: &TicketProfile,
    office_name: &str,
    managers: &'a [Manager],
) -> Vec<&'a Manager> {
    let office = office_name.to_lowercase();

    // 1. Office match (case-insensitive) + active only.
    let mut pool: Vec<&Manager> = managers
        .iter()
        .filter(|m| m.active && m.office.to_lowercase() == office)
        .collect();

    // 2. VIP/Priority segment or high priority requires the VIP skill.
    if profile.is_vip_or_priority() {
        pool.retain(|m| m.has_skill(Skill::Vip));
    }

    // 3. Data changes may only be handled by chief specialists.
    if profile.is_data_change() {
        pool.retain(|m| m.position == Position::ChiefSpecialist);
    }

    // 4. Language gating, soft: an empty narrowing keeps the prior set.
    let language_skill = match profile.language {
        Language::Kz => Some(Skill::Kz),
        Language::Eng => Some(Skill::Eng),
        Language::Ru => None,
    };
    if let Some(skill) = language_skill {
        let speakers: Vec<&Manager> = pool
            .iter()
            .copied()
            .filter(|m| m.has_skill(skill))
            .collect();
        if speakers.is_empty() {
            debug!(
                office = office_name,
                language = %profile.language,
                "no manager speaks the ticket language, keeping prior pool"
            );
        } else {
            pool = speakers;
        }
    }

    pool
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::domain::{RequestType, Segment};

    use super::*;

    fn manager(id: &str, office: &str, position: Position, skills: &[Skill], workload: u32) -> Manager {
        Manager {
            manager_id: id.to_string(),
            full_name: format!("Manager {id}"),
            position,
            skills: skills.iter().copied().collect::<HashSet<_>>(),
            office: office.to_string(),
            workload,
            active: true,
        }
    }

    fn profile(segment: Segment, request_type: RequestType, language: Language, priority: u8) -> TicketProfile {
        TicketProfile {
            segment,
            request_type,
            language,
            priority_score: priority,
        }
    }

    #[test]
    fn test_office_match_is_case_insensitive() {
        let managers = vec![manager("m1", "ASTANA", Position::Specialist, &[], 0)];
        let p = profile(Segment::Mass, RequestType::Consultation, Language::Ru, 4);
        assert_eq!(filter_eligible_managers(&p, "Astana", &managers).len(), 1);
        assert_eq!(filter_eligible_managers(&p, "Almaty", &managers).len(), 0);
    }

    #[test]
    fn test_inactive_managers_are_dropped() {
        let mut m = manager("m1", "Astana", Position::Specialist, &[], 0);
        m.active = false;
        let p = profile(Segment::Mass, RequestType::Consultation, Language::Ru, 4);
        assert!(filter_eligible_managers(&p, "Astana", &[m]).is_empty());
    }

    #[test]
    fn test_vip_segment_with_soft_kz_fallback() {
        // M1 {VIP,KZ}, M2 {VIP}, M3 {KZ}: VIP step keeps {M1, M2},
        // KZ step narrows to {M1}.
        let managers = vec![
            manager("m1", "Astana", Position::Specialist, &[Skill::Vip, Skill::Kz], 3),
            manager("m2", "Astana", Position::Specialist, &[Skill::Vip], 1),
            manager("m3", "Astana", Position::Specialist, &[Skill::Kz], 0),
        ];
        let p = profile(Segment::Vip, RequestType::Complaint, Language::Kz, 7);
        let eligible = filter_eligible_managers(&p, "Astana", &managers);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].manager_id, "m1");
    }

    #[test]
    fn test_high_priority_forces_vip_skill() {
        let managers = vec![
            manager("vip", "Astana", Position::Specialist, &[Skill::Vip], 5),
            manager("plain", "Astana", Position::Specialist, &[], 0),
        ];
        let p = profile(Segment::Mass, RequestType::FraudulentActivity, Language::Ru, 9);
        let eligible = filter_eligible_managers(&p, "Astana", &managers);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].manager_id, "vip");
    }

    #[test]
    fn test_data_change_requires_chief() {
        let managers = vec![
            manager("c1", "Astana", Position::ChiefSpecialist, &[], 2),
            manager("s1", "Astana", Position::Specialist, &[], 0),
            manager("s2", "Astana", Position::SeniorSpecialist, &[], 0),
        ];
        let p = profile(Segment::Mass, RequestType::DataChange, Language::Ru, 5);
        let eligible = filter_eligible_managers(&p, "Astana", &managers);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].manager_id, "c1");
    }

    #[test]
    fn test_language_fallback_keeps_prior_pool_when_empty() {
        let managers = vec![
            manager("m1", "Astana", Position::Specialist, &[], 0),
            manager("m2", "Astana", Position::Specialist, &[], 1),
        ];
        let p = profile(Segment::Mass, RequestType::Consultation, Language::Eng, 3);
        // Nobody speaks English; the office pool survives unchanged.
        assert_eq!(filter_eligible_managers(&p, "Astana", &managers).len(), 2);
    }

    #[test]
    fn test_language_narrowing_applies_when_nonempty() {
        let managers = vec![
            manager("eng", "Astana", Position::Specialist, &[Skill::Eng], 0),
            manager("plain", "Astana", Position::Specialist, &[], 0),
        ];
        let p = profile(Segment::Mass, RequestType::Consultation, Language::Eng, 3);
        let eligible = filter_eligible_managers(&p, "Astana", &managers);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].manager_id, "eng");
    }

    #[test]
    fn test_russian_has_no_language_gate() {
        let managers = vec![
            manager("kz", "Astana", Position::Specialist, &[Skill::Kz], 0),
            manager("plain", "Astana", Position::Specialist, &[], 0),
        ];
        let p = profile(Segment::Mass, RequestType::Consultation, Language::Ru, 3);
        assert_eq!(filter_eligible_managers(&p, "Astana", &managers).len(), 2);
    }
}
