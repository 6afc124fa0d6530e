mod cli;
mod completions;
mod config;
mod engine;
mod paths;
mod store;
mod tree;
mod ui;
mod verify;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn print_json(value: &impl serde::Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).expect("json serialization should work")
    );
}

fn run() -> Result<(), engine::EngineError> {
    use clap::Parser;
    use cli::Commands;

    let cli = cli::Cli::parse();

    if let Commands::Completions(args) = &cli.command {
        return run_completions(args);
    }

    let config = config::Config::load(&cli.config)?;
    let mut engine = engine::Engine::open(&cli.db, config)?;
    for issue in engine.build_issues() {
        eprintln!("warning: {}", issue);
    }

    match cli.command {
        Commands::Init => {
            println!(
                "arb init completed ({} node(s) loaded)",
                engine.node_count()
            );
        }
        Commands::Add(args) => {
            let parent = args.under.unwrap_or(store::ROOT_ID);
            let position = match args.at {
                Some(position) => position,
                None => engine.child_count(parent)?,
            };
            let node = engine.insert_node(parent, position, &args.name, args.desc.as_deref())?;
            if args.json {
                print_json(&node);
            } else {
                println!("added {} {}", node.id, node.name);
            }
        }
        Commands::Rm(args) => {
            engine.remove_node(args.id)?;
            println!("removed {} (children promoted)", args.id);
        }
        Commands::Mv(args) => {
            let new_parent = args.to.unwrap_or(store::ROOT_ID);
            let position = match args.at {
                Some(position) => position,
                None => engine.child_count(new_parent)?,
            };
            let summary = engine.move_nodes(&args.ids, new_parent, position)?;
            if args.json {
                print_json(&summary);
            } else {
                ui::print_move_summary(&summary);
            }
        }
        Commands::Rename(args) => {
            let node = engine.rename_node(args.id, &args.name)?;
            println!("renamed {} -> {}", node.id, node.name);
        }
        Commands::Describe(args) => {
            let node = engine.describe_node(args.id, &args.text)?;
            println!("described {}", node.id);
        }
        Commands::Show(args) => match engine.node_view(args.id) {
            Some(node) => {
                if args.json {
                    print_json(&node);
                } else {
                    ui::print_node(&node);
                }
            }
            None => return Err(engine::EngineError::NotFound(args.id)),
        },
        Commands::Tree(args) => {
            let rows = engine.tree_rows();
            if args.json {
                print_json(&rows);
            } else {
                ui::print_tree(&rows);
            }
        }
        Commands::Paths(args) => {
            if args.json {
                print_json(engine.leaf_paths());
            } else {
                ui::print_leaf_paths(engine.leaf_paths());
            }
        }
        Commands::Resolve(args) => match engine.resolve_node_id(&args.path) {
            Some(id) => println!("{id}"),
            None => {
                return Err(engine::EngineError::InvalidArgument(format!(
                    "no leaf at path '{}'",
                    args.path
                )))
            }
        },
        Commands::Sort(args) => {
            let key = engine::parse_sort_key(&args.key)?;
            engine.sort_children(key, !args.descending);
            let rows = engine.tree_rows();
            if args.json {
                print_json(&rows);
            } else {
                ui::print_tree(&rows);
            }
        }
        Commands::Check(args) => {
            let report = engine.audit()?;
            if args.json {
                print_json(&report);
            } else {
                ui::print_verify_report(&report);
            }
            if !report.ok() {
                return Err(engine::EngineError::InvalidArgument(format!(
                    "check found {} issue(s)",
                    report.issues.len()
                )));
            }
        }
        Commands::Completions(_) => {
            unreachable!("completions are handled before engine initialization")
        }
    }

    Ok(())
}

fn run_completions(args: &cli::CompletionsArgs) -> Result<(), engine::EngineError> {
    let shell = match args.shell.as_deref() {
        Some(raw) => completions::parse_shell(raw).ok_or_else(|| {
            engine::EngineError::InvalidArgument(format!("unsupported shell '{}'", raw))
        })?,
        None => completions::detect_current_shell().ok_or_else(|| {
            engine::EngineError::InvalidArgument(
                "unable to detect shell; pass one explicitly".to_string(),
            )
        })?,
    };

    if args.install {
        let path = completions::install_completions(shell)?;
        println!("installed completions to {}", path.display());
    } else {
        let mut stdout = std::io::stdout();
        completions::generate_completions(shell, &mut stdout);
    }
    Ok(())
}
