use std::fmt::Write;

use flexplane::{FlatPlate, SolveReport, SolveStatus};

/// Render a textual summary of a solve report.
///
/// Non-converged reports stop after the residuals and the diagnostic.
#[must_use]
pub fn render_summary(report: &SolveReport) -> String {
    let mut output = String::new();

    // Outcome first, so a failed run is obvious before any numbers.
    writeln!(
        &mut output,
        "Status: {:?} after {} outer iterations{}",
        report.status,
        report.iterations,
        if report.retried { " (retried once)" } else { "" }
    )
    .expect("writing to string cannot fail");

    // Residuals of the last recorded iteration, normalized by the stagnation
    // pressure and the surface length.
    if let Some(last) = report.history.last() {
        let residuals = last.residuals;
        writeln!(
            &mut output,
            "Final residuals: shape = {:.2e}, pressure = {:.2e}, region = {:.2e}, force = {:.2e}, moment = {:.2e}",
            residuals.shape, residuals.pressure, residuals.region, residuals.force, residuals.moment
        )
        .expect("writing to string cannot fail");
    }

    let Some(solution) = &report.solution else {
        if let Some(diagnostic) = &report.diagnostic {
            writeln!(&mut output, "Diagnostic: {diagnostic}").expect("writing to string cannot fail");
        }
        return output;
    };

    // Arclengths are measured from the leading edge along the undeformed surface.
    if let (Some(entry), Some(separation)) = (solution.entry, solution.separation) {
        writeln!(
            &mut output,
            "Wetted region: s = {entry:.4} m to {separation:.4} m (length {:.4} m)",
            solution.wetted_length
        )
        .expect("writing to string cannot fail");
    } else {
        output.push_str("Wetted region: dry\n");
    }

    writeln!(
        &mut output,
        "Attitude: draft = {:.5} m, trim = {:.3} deg, max deflection: {:.3e} m",
        solution.draft, solution.trim_deg, solution.max_deflection
    )
    .expect("writing to string cannot fail");

    // The moment is counter-clockwise positive about the pivot.
    writeln!(
        &mut output,
        "Forces per unit span: lift = {:.2} N/m, drag = {:.2} N/m, moment = {:+.2} N·m/m",
        solution.forces.lift, solution.forces.drag, solution.forces.moment
    )
    .expect("writing to string cannot fail");

    output
}

/// Compare a converged report against the closed-form flat plate.
#[must_use]
pub fn render_comparison(report: &SolveReport, plate: &FlatPlate, weight: f64) -> String {
    let mut output = String::new();
    let expected = plate.wetted_length(weight);
    // Compare converged solutions only.
    write!(&mut output, "Closed-form wetted length: {expected:.4} m")
        .expect("writing to string cannot fail");
    if let (Some(solution), SolveStatus::Converged) = (&report.solution, report.status) {
        let error = (solution.wetted_length - expected) / expected;
        write!(&mut output, " (computed differs by {:+.2}%)", 100.0 * error)
            .expect("writing to string cannot fail");
    }
    output.push('\n');
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexplane::{ConvergenceHistory, HydroForces, SolutionSnapshot};

    fn converged() -> SolveReport {
        SolveReport {
            status: SolveStatus::Converged,
            iterations: 11,
            retried: false,
            history: ConvergenceHistory::default(),
            solution: Some(SolutionSnapshot {
                arclengths: vec![0.0, 1.0],
                positions: Vec::new(),
                deflections: Vec::new(),
                element_pressures: Vec::new(),
                panels: Vec::new(),
                entry: Some(0.5),
                separation: Some(1.0),
                wetted_length: 0.5,
                draft: 0.0349,
                trim_deg: 4.0,
                forces: HydroForces {
                    lift: 2000.0,
                    drag: 139.86,
                    moment: -250.0,
                },
                max_deflection: 0.0,
            }),
            diagnostic: None,
        }
    }

    #[test]
    fn summary_mentions_key_values() {
        let text = render_summary(&converged());
        assert!(text.contains("Status: Converged after 11 outer iterations"));
        assert!(text.contains("Wetted region: s = 0.5000 m to 1.0000 m (length 0.5000 m)"));
        assert!(text.contains("trim = 4.000 deg"));
        assert!(text.contains("lift = 2000.00 N/m"));
    }

    #[test]
    fn failed_reports_show_the_diagnostic() {
        let report = SolveReport {
            status: SolveStatus::Diverged,
            solution: None,
            diagnostic: Some("coupling diverged".to_owned()),
            ..converged()
        };
        let text = render_summary(&report);
        assert!(text.contains("Diagnostic: coupling diverged"));
        assert!(!text.contains("Wetted region"));
    }

    #[test]
    fn comparison_reports_relative_error() {
        let plate = FlatPlate {
            speed: 6.0418,
            density: 1000.0,
            trim: 4.0_f64.to_radians(),
        };
        let text = render_comparison(&converged(), &plate, 2000.0);
        assert!(text.starts_with("Closed-form wetted length: 0.5000 m"));
    }
}
