use statement_mapper::{
    loader::parse_table, AccountNames, MapperConfig, OutputFormat, StatementProcessor, BS_COLUMNS,
};
use std::collections::BTreeMap;

const JPCRP_EXPORT: &str = "\
要素ID\t項目名\tコンテキストID\t相対年度\t連結・個別\t期間・時点\tユニットID\t単位\t値
jppfs_cor:CashAndDeposits\t現金及び預金\tCurrentYearInstant\t当期末\t連結\t時点\tJPY\t円\t1,250,000
jppfs_cor:CashAndDeposits\t現金及び預金\tPrior1YearInstant\t前期末\t連結\t時点\tJPY\t円\t980,000
jppfs_cor:NotesAndAccountsReceivableTrade\t受取手形及び売掛金\tCurrentYearInstant\t当期末\t連結\t時点\tJPY\t円\t430,000
jppfs_cor:AllowanceForDoubtfulAccountsCA\t貸倒引当金\tCurrentYearInstant\t当期末\t連結\t時点\tJPY\t円\t△12,000
jppfs_cor:LeaseObligationsCL\tリース債務\tCurrentYearInstant\t当期末\t連結\t時点\tJPY\t円\t※4 35,000
jppfs_cor:LeaseObligationsNCL\tリース債務（固定）\tCurrentYearInstant\t当期末\t連結\t時点\tJPY\t円\t120,000
jppfs_cor:CapitalStock\t資本金\tCurrentYearInstant\t当期末\t連結\t時点\tJPY\t円\t500,000
jppfs_cor:NetSales\t売上高\tCurrentYearDuration\t当期\t連結\t期間\tJPY\t円\t9,000,000
";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = MapperConfig::default();
    config.input.format = statement_mapper::InputFormat::Jpcrp;
    config.input.infer_current_period = true;
    config.output.format = OutputFormat::Bs;
    config.account_mapping.insert(
        "負債".to_string(),
        BTreeMap::from([
            ("リース債務".to_string(), "リース債務（流動）".to_string()),
            ("リース債務（固定）".to_string(), "リース債務（固定）".to_string()),
        ]),
    );

    for (leaf, names) in [
        ("現金及び預金", vec!["現金及び預金"]),
        ("受取手形及び売掛金", vec!["受取手形及び売掛金"]),
        ("流動資産/貸倒引当金", vec!["貸倒引当金"]),
        ("流動負債/リース債務", vec!["リース債務（流動）"]),
        ("固定負債/リース債務", vec!["リース債務（固定）"]),
        ("資本金", vec!["資本金"]),
    ] {
        config.balance_sheet.account_mapping.insert(
            leaf.to_string(),
            AccountNames::Many(names.into_iter().map(String::from).collect()),
        );
    }

    let table = parse_table(JPCRP_EXPORT, b'\t')?;
    let processor = StatementProcessor::new(&config)?;
    let processed = processor.process_table(table, false)?;

    println!("Balance sheet ({} columns per row):", BS_COLUMNS);
    for row in &processed.output.rows {
        println!(
            "  {:<8} {:<8} {:<12} {:<20} {:>12} {}",
            row[0], row[1], row[2], row[3], row[8], row[5]
        );
    }

    let summary = &processed.summary;
    println!(
        "\n{} rows read, {} outside the current period, {} not on the balance sheet",
        summary.rows_read, summary.rows_outside_period, summary.unclassified
    );
    println!("Summary as JSON: {}", serde_json::to_string_pretty(summary)?);

    Ok(())
}
