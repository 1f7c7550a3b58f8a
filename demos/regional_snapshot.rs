use pledge_reconciliation::{
    reconcile_raw, PivotLayout, RawReconciliationInput, ReconciliationConfig, RollupLabel,
};
use serde_json::json;

fn main() {
    let raw: RawReconciliationInput = serde_json::from_value(json!({
        "commitments": [
            {
                "id": 6704457001u64, "region": "Africa", "commitment_type": "3-Year Pledge",
                "total_commitment": 30000, "group": "2024", "linked_gift_ids": [1, 2]
            },
            {
                "id": 6704457002u64, "region": "Latin America", "commitment_type": "One-time",
                "total_commitment": "5,000", "group": "2025", "linked_gift_ids": [3]
            },
            {
                "id": 6704457003u64, "region": "Middle East", "commitment_type": "One-time",
                "total_commitment": 2500, "group": "2024", "linked_gift_ids": []
            }
        ],
        "gifts": [
            {"id": 1, "amount": 6000, "group": "2024 Gifts", "mapped_class": "Restricted - MD Scholars"},
            {"id": 2, "amount": 9000, "group": "2025 Gifts", "mapped_class": "Restricted - Global Work"},
            {"id": 3, "amount": 1200, "group": "2025 Gifts", "mapped_class": "Unrestricted"}
        ]
    }))
    .expect("demo input should deserialize");

    let config = ReconciliationConfig::default();
    let layout = PivotLayout::regional_snapshot(&config.periods.current);
    let report = reconcile_raw(&config, &raw, &layout).expect("reconciliation should succeed");

    println!("Region balances:");
    for balance in &report.region_balances {
        println!(
            " - {:<15} earlier {:>10.2}  current {:>10.2}  total {:>10.2}",
            balance.region, balance.balance_earlier, balance.balance_current, balance.balance_total
        );
    }

    println!("\nRollup:");
    for row in report.rollup.rows() {
        println!(
            " - {:<15} {:<26} {:>10.2} {:>10.2} {:>10.2}",
            row.region.as_str(),
            row.class.as_str(),
            row.amount,
            row.additions_earlier,
            row.additions_current
        );
    }

    if let Some(grand) = report.rollup.get(&RollupLabel::Total, &RollupLabel::Total) {
        println!("Grand total received: {:.2}", grand.amount);
    }

    println!("\nSnapshot:");
    print!("{:<30}", "");
    for column in report.pivot.column_labels() {
        print!("{:>15}", column);
    }
    println!();
    for (label, values) in report.pivot.row_labels().iter().zip(report.pivot.cells()) {
        print!("{:<30}", label);
        for value in values {
            print!("{:>15.2}", value);
        }
        println!();
    }
}
