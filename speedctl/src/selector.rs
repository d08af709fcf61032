//! Random choice of a throughput target within one category.

use crate::db::models::hosts::Host;
use crate::errors::{Error, Result};
use crate::types::HostCategory;
use rand::prelude::RngExt;

/// Pick one active host in `category`, uniformly at random.
///
/// Returns [`Error::NoEligibleHosts`] when nothing qualifies; callers treat that as a skip.
pub fn select_host(hosts: &[Host], category: HostCategory) -> Result<&Host> {
    let mut rng = rand::rng();
    select_host_with(hosts, category, &mut rng)
}

/// [`select_host`] with a caller-supplied RNG.
pub fn select_host_with<'h, R>(hosts: &'h [Host], category: HostCategory, rng: &mut R) -> Result<&'h Host>
where
    R: RngExt + ?Sized,
{
    let eligible: Vec<&Host> = hosts.iter().filter(|h| h.active && h.category == category).collect();
    if eligible.is_empty() {
        return Err(Error::NoEligibleHosts { category });
    }

    Ok(eligible[rng.random_range(0..eligible.len())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn host(id: i64, category: HostCategory, active: bool) -> Host {
        Host {
            id,
            name: format!("host-{id}"),
            hostname: format!("10.0.0.{id}"),
            port: 5201,
            category,
            active,
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_only_active_hosts_in_category_are_selected() {
        let hosts = vec![
            host(1, HostCategory::Lan, false),
            host(2, HostCategory::Vpn, true),
            host(3, HostCategory::Lan, true),
        ];

        for _ in 0..100 {
            assert_eq!(select_host(&hosts, HostCategory::Lan).unwrap().id, 3);
        }
    }

    #[test]
    fn test_no_eligible_hosts() {
        let hosts = vec![host(1, HostCategory::Vpn, false), host(2, HostCategory::Lan, true)];

        let err = select_host(&hosts, HostCategory::Vpn).unwrap_err();
        assert!(matches!(err, Error::NoEligibleHosts { category: HostCategory::Vpn }));
        assert!(matches!(
            select_host(&[], HostCategory::Remote),
            Err(Error::NoEligibleHosts { category: HostCategory::Remote })
        ));
    }

    #[test]
    fn test_selection_is_uniform() {
        let hosts: Vec<Host> = (1..=4).map(|id| host(id, HostCategory::Remote, true)).collect();
        let draws = 10_000;

        let mut counts: HashMap<i64, usize> = HashMap::new();
        for _ in 0..draws {
            *counts.entry(select_host(&hosts, HostCategory::Remote).unwrap().id).or_default() += 1;
        }

        assert_eq!(counts.len(), hosts.len());
        let expected = draws as f64 / hosts.len() as f64;
        for (id, count) in counts {
            let deviation = (count as f64 - expected).abs() / expected;
            assert!(deviation < 0.1, "host {id} drawn {count} times, expected about {expected}");
        }
    }
}
