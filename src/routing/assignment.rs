//! Ticket-to-manager assignment walk.
//!
//! Starting from the nearest office, walks outward through neighbour
//! offices until the competency filter yields candidates, then lets
//! the round-robin state pick one and bumps that manager's in-memory
//! workload.

use tracing::debug;

use crate::domain::{Manager, Office, RequestType};
use crate::geo::distance::sorted_offices_by_distance;

use super::competency::filter_eligible_managers;
use super::round_robin::RoundRobinState;
use super::TicketProfile;

/// What the assignment walk resolved: the office the ticket belongs
/// to, and the chosen manager id when one was eligible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickResult {
    pub manager_id: Option<String>,
    pub office_name: String,
}

/// Pick a manager for a ticket whose nearest office is already known.
///
/// Spam is never assigned. When the nearest office has no eligible
/// manager, neighbour offices are tried in ascending distance order;
/// the first office with candidates becomes the resolved office. The
/// chosen manager's workload is incremented before returning.
pub fn pick_manager(
    profile: &TicketProfile,
    nearest: &Office,
    offices: &[Office],
    managers: &mut [Manager],
    rr: &mut RoundRobinState,
) -> PickResult {
    if profile.request_type == RequestType::Spam {
        return PickResult {
            manager_id: None,
            office_name: nearest.name.clone(),
        };
    }

    let mut office_name = nearest.name.clone();
    let chosen_id = {
        let mut eligible = filter_eligible_managers(profile, &office_name, managers);

        if eligible.is_empty() {
            for neighbour in sorted_offices_by_distance(nearest, offices) {
                let candidates = filter_eligible_managers(profile, &neighbour, managers);
                if !candidates.is_empty() {
                    debug!(
                        from = %nearest.name,
                        to = %neighbour,
                        "no eligible manager at nearest office, falling back"
                    );
                    office_name = neighbour;
                    eligible = candidates;
                    break;
                }
            }
        }

        rr.choose(&office_name, profile, &eligible)
            .map(|m| m.manager_id.clone())
    };

    if let Some(ref id) = chosen_id {
        if let Some(m) = managers.iter_mut().find(|m| m.manager_id == *id) {
            m.workload += 1;
        }
    }

    PickResult {
        manager_id: chosen_id,
        office_name,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::domain::{Language, Position, Segment, Skill};

    use super::*;

    fn office(name: &str, lat: f64, lon: f64) -> Office {
        Office {
            name: name.to_string(),
            address: format!("{name} office"),
            latitude: Some(lat),
            longitude: Some(lon),
        }
    }

    fn manager(id: &str, office: &str, skills: &[Skill], workload: u32) -> Manager {
        Manager {
            manager_id: id.to_string(),
            full_name: format!("Manager {id}"),
            position: Position::Specialist,
            skills: skills.iter().copied().collect::<HashSet<_>>(),
            office: office.to_string(),
            workload,
            active: true,
        }
    }

    fn profile(request_type: RequestType) -> TicketProfile {
        TicketProfile {
            segment: Segment::Mass,
            request_type,
            language: Language::Ru,
            priority_score: 4,
        }
    }

    #[test]
    fn test_spam_never_assigns() {
        let astana = office("Astana", 51.1694, 71.4491);
        let offices = vec![astana.clone()];
        let mut managers = vec![manager("m1", "Astana", &[], 0)];
        let mut rr = RoundRobinState::new();

        let result = pick_manager(&profile(RequestType::Spam), &astana, &offices, &mut managers, &mut rr);
        assert_eq!(result.manager_id, None);
        assert_eq!(result.office_name, "Astana");
        assert_eq!(managers[0].workload, 0);
    }

    #[test]
    fn test_assignment_bumps_workload() {
        let astana = office("Astana", 51.1694, 71.4491);
        let offices = vec![astana.clone()];
        let mut managers = vec![manager("m1", "Astana", &[], 2)];
        let mut rr = RoundRobinState::new();

        let result = pick_manager(
            &profile(RequestType::Consultation),
            &astana,
            &offices,
            &mut managers,
            &mut rr,
        );
        assert_eq!(result.manager_id.as_deref(), Some("m1"));
        assert_eq!(managers[0].workload, 3);
    }

    #[test]
    fn test_neighbour_fallback_when_nearest_office_is_empty() {
        let astana = office("Astana", 51.1694, 71.4491);
        let karaganda = office("Karaganda", 49.8047, 73.1094);
        let almaty = office("Almaty", 43.2380, 76.9452);
        let offices = vec![astana.clone(), karaganda.clone(), almaty.clone()];
        // Only Almaty — the farther neighbour — has a manager.
        let mut managers = vec![manager("far", "Almaty", &[], 0)];
        let mut rr = RoundRobinState::new();

        let result = pick_manager(
            &profile(RequestType::Consultation),
            &astana,
            &offices,
            &mut managers,
            &mut rr,
        );
        assert_eq!(result.manager_id.as_deref(), Some("far"));
        assert_eq!(result.office_name, "Almaty");
        assert_eq!(managers[0].workload, 1);
    }

    #[test]
    fn test_no_eligible_manager_anywhere() {
        let astana = office("Astana", 51.1694, 71.4491);
        let almaty = office("Almaty", 43.2380, 76.9452);
        let offices = vec![astana.clone(), almaty];
        // VIP ticket, nobody has the VIP skill anywhere.
        let mut managers = vec![
            manager("m1", "Astana", &[], 0),
            manager("m2", "Almaty", &[], 0),
        ];
        let mut rr = RoundRobinState::new();

        let mut p = profile(RequestType::Complaint);
        p.segment = Segment::Vip;
        let result = pick_manager(&p, &astana, &offices, &mut managers, &mut rr);
        assert_eq!(result.manager_id, None);
        assert_eq!(result.office_name, "Astana");
        assert!(managers.iter().all(|m| m.workload == 0));
    }

    #[test]
    fn test_workload_deltas_match_assigned_count() {
        let astana = office("Astana", 51.1694, 71.4491);
        let offices = vec![astana.clone()];
        let mut managers = vec![
            manager("a", "Astana", &[], 0),
            manager("b", "Astana", &[], 0),
        ];
        let before: u32 = managers.iter().map(|m| m.workload).sum();
        let mut rr = RoundRobinState::new();

        let mut assigned = 0;
        for _ in 0..7 {
            let result = pick_manager(
                &profile(RequestType::Consultation),
                &astana,
                &offices,
                &mut managers,
                &mut rr,
            );
            if result.manager_id.is_some() {
                assigned += 1;
            }
        }

        let after: u32 = managers.iter().map(|m| m.workload).sum();
        assert_eq!(after - before, assigned);
    }
}
