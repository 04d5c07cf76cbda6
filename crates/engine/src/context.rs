//! Read-only aggregation of current farm state.

use chrono::NaiveDate;
use openpasture_store::{FarmSettings, Paddock, PaddockRead, Section};
use tracing::debug;

use crate::Result;

/// Everything the policy and the brief need about the farm, assembled once
/// per run.
#[derive(Debug, Clone)]
pub struct FarmContext {
    pub farm_id: String,
    pub date: NaiveDate,
    pub paddocks: Vec<Paddock>,
    pub current: Option<Paddock>,
    /// Prior sections of the current paddock, newest first.
    pub prior_sections: Vec<Section>,
    /// Percent (0..=100) of the current paddock already grazed.
    pub grazed_percentage: f64,
    pub settings: FarmSettings,
}

pub struct ContextAssembler<'a, S> {
    store: &'a S,
}

impl<'a, S: PaddockRead> ContextAssembler<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Issue the four independent reads concurrently. Any failure aborts
    /// assembly; a partial context is never produced.
    pub async fn assemble(
        &self,
        farm_id: &str,
        current_paddock_id: Option<&str>,
        date: NaiveDate,
        settings: FarmSettings,
    ) -> Result<FarmContext> {
        let (paddocks, current, prior_sections, grazed_percentage) = tokio::try_join!(
            self.store.list_paddocks(farm_id),
            async {
                match current_paddock_id {
                    Some(id) => self.store.get_paddock(farm_id, id).await.map(Some),
                    None => Ok(None),
                }
            },
            async {
                match current_paddock_id {
                    Some(id) => self.store.prior_sections(farm_id, id, date).await,
                    None => Ok(Vec::new()),
                }
            },
            async {
                match current_paddock_id {
                    Some(id) => self.store.grazed_percentage(farm_id, id, date).await,
                    None => Ok(0.0),
                }
            },
        )?;

        debug!(
            farm_id,
            paddocks = paddocks.len(),
            prior_sections = prior_sections.len(),
            grazed_percentage,
            "farm context assembled"
        );

        Ok(FarmContext {
            farm_id: farm_id.to_string(),
            date,
            paddocks,
            current,
            prior_sections,
            grazed_percentage,
            settings,
        })
    }
}
