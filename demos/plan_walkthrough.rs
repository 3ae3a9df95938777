use financial_plan_engine::{
    effective_macro_totals, overview_series, BusinessPlanDraft, CausaliCatalog, CompanyContext,
    EngineConfig, MemoryStore, PlanSession, RawMonthValue, RawPlanRow, StatsRow, Track,
    COSTI_FISSI,
};

const CAT_FISSI: &str = "Rete vendita, Amministratori, Immobili";

fn month(label: &str, preventivo: Option<f64>, consuntivo: Option<f64>) -> RawMonthValue {
    RawMonthValue {
        month: label.to_string(),
        preventivo,
        consuntivo,
    }
}

fn main() -> anyhow::Result<()> {
    let rows = vec![
        RawPlanRow {
            macro_category: "INCASSATO".to_string(),
            detail: "Incassato".to_string(),
            months: vec![
                month("Gennaio 2025", Some(11_000.0), Some(10_000.0)),
                month("Febbraio 2025", Some(11_000.0), Some(9_500.0)),
            ],
        },
        RawPlanRow {
            macro_category: "COSTI FISSI".to_string(),
            detail: "Affitto".to_string(),
            months: vec![
                month("Gennaio 2025", None, Some(1_000.0)),
                month("Febbraio 2025", None, Some(1_000.0)),
            ],
        },
        RawPlanRow {
            macro_category: "COSTI VARIABILI".to_string(),
            detail: "Freelance".to_string(),
            months: vec![month("Gennaio 2025", Some(2_000.0), Some(1_750.0))],
        },
    ];
    let stats = vec![StatsRow {
        month: "Gen. 25".to_string(),
        fatturato_totale: Some(12_500.0),
        ..Default::default()
    }];

    let store = MemoryStore::new();
    let ctx = CompanyContext::new("demo-srl")?.with_location("torino");

    let mut session = PlanSession::new(
        EngineConfig::default(),
        rows,
        stats,
        CausaliCatalog::builtin(),
    )?;
    futures::executor::block_on(session.load(&store, &ctx))?;

    println!("Catalog:\n{}", session.catalog().to_markdown());

    let before = session.read(Track::Preventivo, "COSTI FISSI", CAT_FISSI, "Affitto", 2025, 0);
    let outcome = session.write(
        Track::Preventivo,
        "COSTI FISSI",
        CAT_FISSI,
        "Affitto",
        2025,
        0,
        Some(900.0),
    )?;
    println!(
        "Affitto {} preventivo: {:.2} -> {:.2} (editing: {}, dirty: {})",
        outcome.month_key,
        before,
        session.read(Track::Preventivo, "COSTI FISSI", CAT_FISSI, "Affitto", 2025, 0),
        outcome.entered_editing,
        outcome.dirty_count
    );

    if let Some(year_data) = session.year(2025) {
        let fixed =
            effective_macro_totals(&session.view(), year_data, COSTI_FISSI, Track::Preventivo);
        println!("Effective COSTI FISSI preventivo, January: {:.2}", fixed[0]);

        for point in overview_series(year_data).iter().take(2) {
            println!(
                " - {}: incassato {:.2}, utile {:.2}",
                point.label, point.incassato, point.utile
            );
        }
    }

    let report = futures::executor::block_on(session.save(&store, &ctx, 2025))?;
    println!(
        "Saved {}: {} audit entr(ies), {} dirty cell(s) cleared",
        ctx.storage_key(),
        report.audit_entries.len(),
        report.cleared_dirty
    );
    for entry in &report.audit_entries {
        println!(" - {} = {:.2}", entry.id, entry.value);
    }

    let metrics = session.year_metrics();
    let draft = BusinessPlanDraft::from_metrics(metrics.get(&2025), 2025, 2026)
        .with_increment(metrics.get(&2025).map(|m| m.fatturato_totale).unwrap_or(0.0), 8.0);
    println!(
        "Draft {}: fatturato {:.2}, utile {:.2} ({:.2}%)",
        draft.target_year,
        draft.fatturato_previsionale,
        draft.utile_previsionale(),
        draft.utile_percent()
    );

    Ok(())
}
