//! Text rendering of the aggregate view for the terminal.

use std::fmt::Write;

use crate::dashboard::{AggregateView, CategoryView, CmdsView, FeedState, FrsView, ManualView, VpView};
use crate::freshness::Staleness;
use crate::scoring::{ComponentValue, ZoneCheck};

fn marker(staleness: Staleness) -> &'static str {
    match staleness {
        Staleness::Fresh => "fresh",
        Staleness::Aging => "aging",
        Staleness::Stale => "STALE",
        Staleness::Unknown => "unknown",
    }
}

fn zone_text(zone: &ZoneCheck) -> String {
    match zone {
        ZoneCheck::Mismatch { upstream, local } if zone.understates_risk() => {
            format!("{} (local table says {}, more severe)", upstream, local)
        }
        ZoneCheck::Mismatch { upstream, local } => format!("{} (local table says {})", upstream, local),
        ZoneCheck::Unrecognized { raw, fallback, .. } => format!("{} (upstream sent '{}')", fallback, raw),
        other => other.display().to_string(),
    }
}

fn section<T>(out: &mut String, title: &str, state: &FeedState<T>, body: impl FnOnce(&mut String, &T)) {
    let _ = writeln!(out, "── {} ──", title);
    match state {
        FeedState::Pending => {
            let _ = writeln!(out, "  loading...");
        }
        FeedState::Failed(err) => {
            let _ = writeln!(out, "  error: {}", err);
        }
        FeedState::Ready(view) => body(out, view),
    }
}

fn cmds(out: &mut String, view: &CmdsView) {
    let _ = writeln!(
        out,
        "  {:.1} {}  [{} · {}]",
        view.score,
        zone_text(&view.zone),
        view.freshness.age_label,
        marker(view.freshness.staleness)
    );
    let _ = writeln!(
        out,
        "  FRS {:.1} (+{:.1})  VP {:.1} (+{:.1})  divergence {:.1}",
        view.components.frs,
        view.components.frs_contribution,
        view.components.vp,
        view.components.vp_contribution,
        view.divergence
    );
    if let Some(w) = view.weights {
        let _ = writeln!(out, "  weights FRS {:.0}%  VP {:.0}%", w.frs_weight * 100.0, w.vp_weight * 100.0);
    }
    let _ = writeln!(out, "  {}", view.interpretation);
    if let Some(a) = view.allocation {
        let _ = writeln!(
            out,
            "  equity {:.0}-{:.0}%  hedge {:.0}-{:.0}%  cash {:.0}-{:.0}%",
            a.equity_pct[0], a.equity_pct[1], a.hedge_pct[0], a.hedge_pct[1], a.cash_pct[0], a.cash_pct[1]
        );
    }
}

fn category(out: &mut String, view: &CategoryView, now: chrono::DateTime<chrono::Utc>) {
    let risk = view
        .risk_level
        .as_ref()
        .map(|z| format!("  {}", zone_text(z)))
        .unwrap_or_default();
    let check = if view.consistent { "" } else { "  (components do not add up)" };
    let _ = writeln!(out, "  {} {:.1}/{:.0}{}{}", view.name, view.score, view.max, risk, check);

    for c in &view.components {
        let score = c.score.map(|s| format!("{:.1}", s)).unwrap_or_else(|| "-".into());
        let max = c.max.map(|m| format!("/{:.0}", m)).unwrap_or_default();
        let value = match &c.value {
            Some(ComponentValue::Scalar(v)) => format!("  value {}", v),
            Some(ComponentValue::Composite(map)) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                format!("  value {}", parts.join(", "))
            }
            None => String::new(),
        };
        let manual = if c.is_manual { "  [manual]" } else { "" };
        let fresh = c.freshness(now);
        let _ = writeln!(
            out,
            "    {} {}{}{}{}  ({})",
            c.name, score, max, value, manual, fresh.age_label
        );
    }
}

fn frs(out: &mut String, view: &FrsView, now: chrono::DateTime<chrono::Utc>) {
    let prob = view
        .correction_probability
        .map(|p| format!("  correction probability {:.0}%", p * 100.0))
        .unwrap_or_default();
    let _ = writeln!(
        out,
        "  {:.1} {}{}  [{} · {}]",
        view.score,
        zone_text(&view.zone),
        prob,
        view.freshness.age_label,
        marker(view.freshness.staleness)
    );
    for c in &view.categories {
        category(out, c, now);
    }
}

fn vp(out: &mut String, view: &VpView) {
    let window = view
        .window
        .as_ref()
        .map(|w| format!("  window {}", w))
        .unwrap_or_default();
    let _ = writeln!(
        out,
        "  {:.0}  spike probability {:.0}%  signal {}  confidence {}{}  [{} · {}]",
        view.score,
        view.spike_probability * 100.0,
        view.signal_strength,
        view.confidence,
        window,
        view.freshness.age_label,
        marker(view.freshness.staleness)
    );
}

fn manual(out: &mut String, view: &ManualView) {
    let _ = writeln!(out, "  version {}  updated {}", view.version, view.freshness.age_label);
    for group in &view.groups {
        let _ = writeln!(out, "  {}", group.category);
        for f in &group.fields {
            let unit = f.field.metadata.unit.as_deref().unwrap_or("");
            let _ = writeln!(
                out,
                "    {:<40} {} {}  as of {} ({})",
                f.field.label,
                f.field.value,
                unit,
                f.field.as_of.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
                marker(f.freshness.staleness)
            );
        }
    }
}

pub fn render(view: &AggregateView) -> String {
    let mut out = String::new();
    if view.is_loading {
        out.push_str("Loading market risk data...\n");
        return out;
    }
    let now = view.composed_at;
    section(&mut out, "CMDS", &view.cmds, cmds);
    section(&mut out, "FRS", &view.frs, |o, v| frs(o, v, now));
    section(&mut out, "VP", &view.vp, vp);
    section(&mut out, "Manual inputs", &view.manual, manual);
    out
}
