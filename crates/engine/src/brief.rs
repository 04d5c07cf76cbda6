//! Renders the structured brief handed to the generative capability.

use std::fmt::Write;

use openpasture_store::{Paddock, Section};

use crate::context::FarmContext;
use crate::policy::Selection;

/// System persona for the planning round trip.
pub fn system_persona() -> String {
    "You are a rotational grazing planner. You decide where a herd grazes \
     today and draw the day's grazing section as GeoJSON. You communicate \
     exclusively through the declared tools; free-text answers are ignored."
        .to_string()
}

/// Builds the single markdown brief of one run.
pub struct BriefBuilder<'a> {
    pub farm_name: &'a str,
    pub context: &'a FarmContext,
    pub selection: &'a Selection,
    /// Prior sections of the *target* paddock, which may differ from the
    /// current paddock the context was assembled around.
    pub target_sections: &'a [Section],
}

impl BriefBuilder<'_> {
    pub fn build(&self) -> String {
        let mut brief = String::new();
        let ctx = self.context;

        let _ = writeln!(
            brief,
            "# Daily grazing brief — {} — {}\n",
            self.farm_name, ctx.date
        );

        brief.push_str("## Paddocks\n\n");
        brief.push_str("| id | name | NDVI | area (ha) | rest (days) | status |\n");
        brief.push_str("|----|------|------|-----------|-------------|--------|\n");
        for p in &ctx.paddocks {
            let _ = writeln!(
                brief,
                "| {} | {} | {:.2} | {:.1} | {} | {:?} |",
                p.external_id, p.name, p.ndvi_mean, p.area_ha, p.rest_days, p.status
            );
        }

        brief.push_str("\nPaddock boundaries (GeoJSON):\n\n");
        for p in &ctx.paddocks {
            match &p.boundary {
                Some(boundary) => {
                    let _ = writeln!(brief, "- {}: {}", p.external_id, boundary.to_json_value());
                }
                None => {
                    let _ = writeln!(brief, "- {}: no boundary recorded", p.external_id);
                }
            }
        }

        brief.push_str("\n## Current paddock\n\n");
        match &ctx.current {
            Some(current) => {
                self.push_paddock_detail(&mut brief, current);
                let _ = writeln!(
                    brief,
                    "- already grazed this rotation: {:.0}%",
                    ctx.grazed_percentage
                );
            }
            None => brief.push_str("No paddock is currently being grazed.\n"),
        }

        brief.push_str("\n## Target paddock\n\n");
        let target = &self.selection.target;
        let _ = writeln!(
            brief,
            "Recommendation: **{}** to/within **{}** (confidence {:.2}).\n",
            self.selection.recommendation, target.name, self.selection.confidence
        );
        for reason in &self.selection.reasoning {
            let _ = writeln!(brief, "- {reason}");
        }
        brief.push('\n');
        self.push_paddock_detail(&mut brief, target);

        brief.push_str("\n## Prior sections in the target paddock\n\n");
        if self.target_sections.is_empty() {
            brief.push_str("Fresh paddock: no sections recorded this rotation.\n");
        } else {
            for section in self.target_sections {
                let _ = writeln!(
                    brief,
                    "- {} — {:.2} ha — {}",
                    section.date,
                    section.area_ha,
                    section.geometry.to_json_value()
                );
            }
        }

        brief.push_str("\n## Farm settings\n\n");
        let _ = writeln!(
            brief,
            "- minimum NDVI threshold: {:.2}\n- minimum rest period: {} days\n- target section size: about {:.0}% of the paddock area (advisory)",
            ctx.settings.min_ndvi_threshold,
            ctx.settings.min_rest_period_days,
            ctx.settings.default_section_pct * 100.0
        );

        brief.push_str("\n## Required output\n\n");
        brief.push_str(
            "Call `proposeSection` exactly once, then `finalizePlan`.\n\
             \n\
             `proposeSection` required fields:\n\
             - `sectionGeometry`: GeoJSON Polygon, WGS84 lng/lat. A section is \
             mandatory; the polygon must lie entirely within the target paddock \
             boundary above and must not overlap any prior section listed above.\n\
             - `sectionJustification`: one sentence on why this sub-area.\n\
             - `confidence`: number in [0, 1].\n\
             - `reasoning`: ordered list of short statements.\n\
             \n\
             Optional fields: `sectionAreaHectares` (ha), `sectionCentroid` \
             ([lng, lat]), `sectionAvgNdvi` (0-1), `paddockGrazedPercentage` \
             (0-100), `targetPaddockId`.\n",
        );

        brief
    }

    fn push_paddock_detail(&self, brief: &mut String, paddock: &Paddock) {
        let _ = writeln!(
            brief,
            "- id: {}\n- name: {}\n- NDVI: {:.2}\n- area: {:.1} ha\n- rest days: {}\n- status: {:?}",
            paddock.external_id,
            paddock.name,
            paddock.ndvi_mean,
            paddock.area_ha,
            paddock.rest_days,
            paddock.status
        );
        if let Some(boundary) = &paddock.boundary {
            let _ = writeln!(brief, "- boundary (GeoJSON): {}", boundary.to_json_value());
        }
    }
}
