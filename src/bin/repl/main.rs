use std::sync::Arc;
use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use structopt::StructOpt;

use locustdb_codegen::unit_fmt::*;
use locustdb_codegen::*;

mod fmt_table;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "locustdb-codegen",
    about = "Compiles a group-by query over a generated table into specialized pipelines and runs it.",
    author = "Clemens Winter <clemenswinter1@gmail.com>"
)]
struct Opts {
    /// Number of rows in the generated table
    #[structopt(long, default_value = "100000")]
    rows: usize,
    /// Number of distinct values of the `key` column
    #[structopt(long, default_value = "1000")]
    keys: i64,
    /// Seed of the data generator
    #[structopt(long, default_value = "1")]
    seed: u64,
    /// Number of rows per batch
    #[structopt(long)]
    batch_size: Option<usize>,
    /// Force prefetching in hash group-by on (`true`) or off (`false`)
    #[structopt(long)]
    prefetch: Option<bool>,
    /// Memory limit of one query execution in MiB
    #[structopt(long)]
    memory_limit_mb: Option<usize>,
    /// Number of concurrent executions of the compiled query [default: number of cores]
    #[structopt(long)]
    threads: Option<usize>,
    /// Print the compiled pipelines and operators
    #[structopt(long)]
    explain: bool,
    /// Print the result as JSON
    #[structopt(long)]
    json: bool,
    /// Maximum number of result rows printed as a table
    #[structopt(long, default_value = "20")]
    limit: usize,
}

const CATEGORIES: [&str; 5] = ["books", "games", "garden", "music", "toys"];

fn main() {
    env_logger::init();
    let opts = Opts::from_args();

    let mut options = Options::default()
        .with_prefetch(opts.prefetch)
        .with_memory_limit(opts.memory_limit_mb.map(|mb| mb * 1024 * 1024));
    if let Some(batch_size) = opts.batch_size {
        options = options.with_batch_size(batch_size);
    }
    if let Some(threads) = opts.threads {
        options = options.with_threads(threads);
    }

    let start_time = Instant::now();
    let table = generate_table(opts.rows, opts.keys, opts.seed).expect("Failed to generate table");
    println!("Generated {} rows in {}.", short_scale(opts.rows as f64), ns(start_time.elapsed().as_nanos() as u64));

    let plan = match build_plan(&table) {
        Ok(plan) => plan,
        Err(err) => {
            println!("Failed to build plan: {}", err);
            return;
        }
    };
    let query = match CompiledQuery::compile(&plan, &options) {
        Ok(query) => query,
        Err(err) => {
            println!("Failed to compile query: {}", err);
            return;
        }
    };
    if opts.explain {
        println!("\n{}", query.explain());
    }

    let results = std::thread::scope(|s| {
        let handles = (0..options.threads)
            .map(|_| s.spawn(|| query.execute()))
            .collect::<Vec<_>>();
        handles.into_iter().map(|h| h.join().expect("Query execution panicked")).collect::<Vec<_>>()
    });

    let mut outputs = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(output) => outputs.push(output),
            Err(err) => {
                println!("Query failed: {}", err);
                return;
            }
        }
    }
    let output = &outputs[0];
    if outputs.iter().any(|o| o.rows != output.rows) {
        log::warn!("Concurrent executions returned different results");
    }

    if opts.json {
        println!("{}", serde_json::to_string_pretty(output).expect("Failed to serialize result"));
    } else {
        let rows = output.rows
            .iter()
            .take(opts.limit)
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect::<Vec<_>>();
        println!("\n{}", fmt_table::fmt_table(&output.colnames, &rows));
        if output.rows.len() > opts.limit {
            println!("({} more rows)", output.rows.len() - opts.limit);
        }
    }

    let stats = &output.stats;
    println!("\nReturned {} rows in {} ({} executions on {} threads)",
             output.rows.len(), ns(stats.runtime_ns), outputs.len(), options.threads);
    println!("Scanned {} rows in {} batches into {} groups ({} resizes, {} probes, {} finalizations)",
             short_scale(stats.rows_scanned as f64), stats.batches_produced, stats.groups,
             stats.hash_table_resizes, stats.hash_table_probes, stats.finalizations);
    println!("Peak memory {}", bite(stats.memory_peak_bytes as usize));
    log::info!("Done in {}", ns(start_time.elapsed().as_nanos() as u64));
}

fn generate_table(rows: usize, keys: i64, seed: u64) -> Result<Arc<DataTable>, QueryError> {
    let table = Arc::new(DataTable::new("events", vec![
        ("key", SqlType::BigInt),
        ("category", SqlType::Varchar),
        ("quantity", SqlType::Integer),
        ("price", SqlType::Decimal),
    ]));
    let mut rng = XorShiftRng::seed_from_u64(seed);
    let data = (0..rows).map(|_| {
        let price = if rng.random_bool(0.05) {
            RawVal::Null
        } else {
            RawVal::from((rng.random_range(100i64..100_000) as f64) / 100.0)
        };
        vec![
            RawVal::Int(rng.random_range(0..keys.max(1))),
            RawVal::from(CATEGORIES[rng.random_range(0..CATEGORIES.len())]),
            RawVal::Int(rng.random_range(-10..100)),
            price,
        ]
    }).collect::<Vec<_>>();
    table.insert_rows(&data)?;
    Ok(table)
}

/// SELECT category, key % 10 AS bucket, COUNT(*), SUM(quantity), AVG(ROUND(price)), MAX(quantity)
/// FROM events WHERE quantity > 0 GROUP BY category, bucket HAVING COUNT(*) > 1
fn build_plan(table: &Arc<DataTable>) -> Result<PlanNode, QueryError> {
    let mut builder = PlanBuilder::new();
    let scan = builder.scan(table);
    let key = scan.attribute("key")?;
    let category = scan.attribute("category")?;
    let quantity = scan.attribute("quantity")?;
    let price = scan.attribute("price")?;
    let scan = scan.filter(Expr::comparison(ComparisonKind::GreaterThan, Expr::col(&quantity), Expr::constant(Value::integer(0))))?;
    let projection = builder.project(scan, vec![
        ("category", Expr::col(&category)),
        ("bucket", Expr::arithmetic(ArithmeticKind::Modulo, Expr::col(&key), Expr::constant(Value::bigint(10)))),
        ("quantity", Expr::col(&quantity)),
        ("price", Expr::func("round", vec![Expr::col(&price)])),
    ])?;
    let quantity = projection.attribute("quantity")?;
    let price = projection.attribute("price")?;
    let aggregate = builder.aggregate(projection, &["category", "bucket"], vec![
        ("count", AggregateKind::CountStar, None),
        ("total_quantity", AggregateKind::Sum, Some(Expr::col(&quantity))),
        ("avg_price", AggregateKind::Avg, Some(Expr::col(&price))),
        ("max_quantity", AggregateKind::Max, Some(Expr::col(&quantity))),
    ])?;
    let count = aggregate.attribute("count")?;
    aggregate
        .with_estimated_groups(CATEGORIES.len() * 10)
        .having(Expr::comparison(ComparisonKind::GreaterThan, Expr::col(&count), Expr::constant(Value::bigint(1))))
}
