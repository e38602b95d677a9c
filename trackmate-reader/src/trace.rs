//! Feature traces along lineage chains
//!
//! A trace pairs every spot of a chain with its frame and one numeric
//! feature, which is what an intensity-over-time plot needs.

use crate::lineage::Lineage;
use crate::tables::SpotTable;
use crate::types::{ReaderError, Result, SpotId, TrackId};
use serde::Serialize;

/// One sample of a trace
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TracePoint {
    pub frame: u32,
    pub spot: SpotId,
    pub value: f64,
}

/// Feature values along one lineage chain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureTrace {
    pub track: TrackId,
    pub feature: String,
    /// Id of the chain this trace follows
    pub chain: usize,
    /// Id of the parent chain
    pub parent: Option<usize>,
    pub points: Vec<TracePoint>,
}

impl FeatureTrace {
    pub fn frames(&self) -> Vec<u32> {
        self.points.iter().map(|p| p.frame).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Mean of the values, `None` for an empty trace
    pub fn mean(&self) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        Some(self.points.iter().map(|p| p.value).sum::<f64>() / self.points.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Build one trace per chain of `lineage`
pub fn build_traces(lineage: &Lineage, spots: &SpotTable, feature: &str) -> Result<Vec<FeatureTrace>> {
    lineage
        .iter()
        .map(|chain| -> Result<FeatureTrace> {
            let points = chain
                .spots
                .iter()
                .map(|&id| -> Result<TracePoint> {
                    let spot = spots.get(id).ok_or(ReaderError::SpotNotFound(id))?;
                    let value = spot.numeric_feature(feature).ok_or_else(|| {
                        ReaderError::FeatureNotFound {
                            spot: id,
                            feature: feature.to_string(),
                        }
                    })?;
                    Ok(TracePoint {
                        frame: spot.frame,
                        spot: id,
                        value,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(FeatureTrace {
                track: lineage.track,
                feature: feature.to_string(),
                chain: chain.id,
                parent: chain.parent,
                points,
            })
        })
        .collect()
}
