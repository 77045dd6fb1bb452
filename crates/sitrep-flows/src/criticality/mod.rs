//! Criticality workflow: mission propagation, centrality, fusion.

pub mod computation;

use std::time::Duration;

use tracing::info;

use sitrep_core::error::Result;

use crate::isim::IsimClient;
use crate::runtime::{execute_activity, ActivityOptions, RetryPolicy};

const ACTIVITY_TIMEOUT: Duration = Duration::from_secs(3600);

/// Four-step workflow run after topology updates: propagate mission
/// criticality to hosts, persist it, recompute centralities, and fuse the
/// final score.
pub struct CriticalityWorkflow<'a> {
    isim: &'a IsimClient,
}

impl<'a> CriticalityWorkflow<'a> {
    pub fn new(isim: &'a IsimClient) -> Self {
        CriticalityWorkflow { isim }
    }

    pub async fn run(&self) -> Result<String> {
        let options = ActivityOptions::new(ACTIVITY_TIMEOUT, RetryPolicy::publish());
        let isim = self.isim;

        let criticalities =
            execute_activity("compute_mission_criticalities", &options, move || async move {
                let missions = isim.get_missions().await?;
                computation::compute_host_criticalities(&missions)
            })
            .await?;
        info!(hosts = criticalities.len(), "mission criticalities computed");

        let criticalities = &criticalities;
        execute_activity("store_mission_criticalities", &options, move || {
            isim.store_criticality(criticalities)
        })
        .await?;

        execute_activity("compute_criticalities", &options, move || async move {
            let betweenness = isim.compute_betweenness_centrality().await?;
            let degree = isim.compute_degree_centrality().await?;
            Ok(format!("{betweenness}; {degree}"))
        })
        .await?;

        execute_activity("compute_final_criticalities", &options, move || {
            isim.combine_criticality()
        })
        .await
    }
}
