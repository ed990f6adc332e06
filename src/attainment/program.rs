use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

use super::AttainmentCalculator;
use crate::error::CalcError;
use crate::models::{BlendWeights, PoAttainment};
use crate::store::AttainmentStore;

/// Survey score assumed for outcomes with no recorded indirect attainment.
/// Only a missing value falls back to it. A recorded 0.0 is a real survey
/// score and is never read as "not surveyed".
pub const DEFAULT_INDIRECT_ATTAINMENT: f64 = 3.0;

/// Linear blend of direct and indirect attainment. Weights are percentages and
/// are applied as given, even when they do not sum to 100.
pub fn blend(direct: f64, indirect: f64, weights: BlendWeights) -> f64 {
    direct * (weights.direct / 100.0) + indirect * (weights.indirect / 100.0)
}

impl<S: AttainmentStore + 'static> AttainmentCalculator<S> {
    /// Weighted mean of course-level attainment levels over the CO-PO edges of
    /// `po_id` whose course belongs to `program_id`.
    pub async fn direct_po_attainment(
        &self,
        po_id: Uuid,
        program_id: Uuid,
    ) -> Result<f64, CalcError> {
        let edges: Vec<_> = self
            .store
            .co_po_mappings(po_id)
            .await?
            .into_iter()
            .filter(|edge| edge.program_id == program_id)
            .collect();

        if edges.is_empty() {
            debug!(%po_id, %program_id, "no mapped course outcomes in program");
            return Ok(0.0);
        }

        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        for edge in &edges {
            let attainment = self
                .course_co_attainment(edge.co_id, edge.course_id, None)
                .await?;
            let weight = f64::from(edge.weight);
            weighted_sum += f64::from(attainment.attainment_level.value()) * weight;
            total_weight += weight;
        }

        if total_weight == 0.0 {
            return Ok(0.0);
        }

        Ok(weighted_sum / total_weight)
    }

    pub async fn overall_po_attainment(
        &self,
        po_id: Uuid,
        program_id: Uuid,
        weights: BlendWeights,
    ) -> Result<PoAttainment, CalcError> {
        let outcome = self
            .store
            .program_outcome(po_id)
            .await?
            .ok_or_else(|| CalcError::outcome_not_found(po_id))?;
        if outcome.program_id != program_id {
            warn!(
                %po_id,
                %program_id,
                owner = %outcome.program_id,
                "program outcome belongs to another program"
            );
        }

        let direct_attainment = self.direct_po_attainment(po_id, program_id).await?;
        let indirect_attainment = outcome
            .indirect_attainment
            .unwrap_or(DEFAULT_INDIRECT_ATTAINMENT);
        let overall_attainment = blend(direct_attainment, indirect_attainment, weights);

        debug!(
            %po_id,
            %program_id,
            direct_attainment,
            indirect_attainment,
            overall_attainment,
            "program outcome attainment"
        );

        Ok(PoAttainment {
            po_id,
            direct_attainment,
            indirect_attainment,
            overall_attainment,
        })
    }

    /// Attainment of every outcome of a program with the default 70/30 blend.
    pub async fn program_po_attainments(
        &self,
        program_id: Uuid,
    ) -> Result<Vec<PoAttainment>, CalcError> {
        self.program_po_attainments_with(program_id, BlendWeights::default())
            .await
    }

    /// Computes outcomes concurrently, at most `max_concurrency` at a time.
    /// Results follow the store's outcome order. An outcome that disappears
    /// mid-run is skipped; any store failure aborts the whole run.
    pub async fn program_po_attainments_with(
        &self,
        program_id: Uuid,
        weights: BlendWeights,
    ) -> Result<Vec<PoAttainment>, CalcError> {
        let outcomes = self.store.program_outcomes(program_id).await?;
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for (position, outcome) in outcomes.into_iter().enumerate() {
            let calculator = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = calculator
                    .overall_po_attainment(outcome.id, program_id, weights)
                    .await;
                (position, outcome.id, result)
            });
        }

        let mut attainments = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (position, po_id, result) = joined?;
            match result {
                Ok(attainment) => attainments.push((position, attainment)),
                Err(err) if err.is_not_found() => {
                    warn!(%po_id, %program_id, error = %err, "skipping program outcome");
                }
                Err(err) => return Err(err),
            }
        }

        attainments.sort_by_key(|(position, _)| *position);
        Ok(attainments
            .into_iter()
            .map(|(_, attainment)| attainment)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_blend_is_seventy_thirty() {
        let overall = blend(2.0, DEFAULT_INDIRECT_ATTAINMENT, BlendWeights::default());
        assert!((overall - 2.3).abs() < 1e-9);
    }

    #[test]
    fn weights_are_not_renormalised() {
        let weights = BlendWeights {
            direct: 50.0,
            indirect: 10.0,
        };
        let overall = blend(2.0, 3.0, weights);
        assert!((overall - 1.3).abs() < 1e-9);

        let overweight = BlendWeights {
            direct: 100.0,
            indirect: 100.0,
        };
        assert!((blend(2.0, 3.0, overweight) - 5.0).abs() < 1e-9);
    }
}
