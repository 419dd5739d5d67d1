use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    flows::GatedForm,
    validation::{AccountField, CommentField, EntityField, FormSchema, LoginField},
    CatalogContext, ClientEvent, FetchState, ImageUpload, MutationOutcome, Navigation,
    StaticUrlResolver, SubmitOutcome, UploadEvent, WriteFailurePolicy,
};
use shared::domain::{Entity, EntityId};
use storage::Storage;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, LoadedSettings};

#[derive(Parser, Debug)]
#[command(name = "catalog", about = "Product catalog with votes and comments")]
struct Cli {
    #[arg(long, global = true)]
    database_url: Option<String>,
    #[arg(long, global = true, default_value = "catalog.toml")]
    config: PathBuf,
    #[arg(long, global = true)]
    collection: Option<String>,
    #[arg(long, global = true)]
    policy: Option<WriteFailurePolicy>,
    #[arg(long, global = true)]
    log_filter: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Submit {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        company: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        description: String,
        /// File name of an already uploaded image.
        #[arg(long)]
        image_file: Option<String>,
    },
    Show {
        id: String,
    },
    List,
    Vote {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        id: String,
    },
    Comment {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        id: String,
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let LoadedSettings {
        mut settings,
        warnings,
    } = load_settings(&cli.config);
    if let Some(url) = cli.database_url {
        settings.database_url = url;
    }
    if let Some(collection) = cli.collection {
        settings.collection = collection;
    }
    if let Some(policy) = cli.policy {
        settings.write_failure_policy = policy;
    }
    if let Some(filter) = cli.log_filter {
        settings.log_filter = filter;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log_filter))
        .init();
    for warning in &warnings {
        warn!(%warning, "configuration value ignored");
    }

    let database_url = &settings.database_url;
    let storage = Storage::new(database_url).await.map_err(|err| {
        error!(%database_url, error = %err, "failed to open catalog database");
        err
    })?;
    info!(%database_url, collection = %settings.collection, "catalog database ready");

    let ctx = CatalogContext::local(storage.clone())
        .with_collection(settings.collection.clone())
        .with_write_failure_policy(settings.write_failure_policy);
    let mut notices = ctx.subscribe_events();

    match cli.command {
        Command::Register {
            name,
            email,
            password,
        } => {
            let form = ctx.account_form();
            form.controller().set_field(AccountField::Name, name);
            form.controller().set_field(AccountField::Email, email);
            form.controller().set_field(AccountField::Password, password);
            finish(&form, form.submit().await)?;
            if let Some(user) = ctx.auth().current_user().await {
                println!("registered {} ({})", user.display_name, user.uid);
            }
        }
        Command::Submit {
            email,
            password,
            name,
            company,
            url,
            description,
            image_file,
        } => {
            sign_in(&ctx, email, password).await?;
            let resolver = StaticUrlResolver::new(&settings.media_base_url)
                .with_context(|| format!("invalid media base url '{}'", settings.media_base_url))?;
            let upload = ImageUpload::new(ctx.collection(), Arc::new(resolver));
            if let Some(file_name) = image_file {
                upload.handle(UploadEvent::Succeeded { file_name }).await;
            }

            let form = ctx.new_entity_form(upload);
            let controller = form.controller();
            controller.set_field(EntityField::Name, name);
            controller.set_field(EntityField::Company, company);
            controller.set_field(EntityField::Url, url);
            controller.set_field(EntityField::Description, description);
            finish(&form, form.submit().await)?;
            if let Some(id) = form.created() {
                println!("created {id}");
            }
        }
        Command::Show { id } => {
            let page = ctx.entity_page(EntityId::from(id.as_str()));
            print_state(&page.load().await);
        }
        Command::List => {
            for id in storage.list_entity_ids(ctx.collection()).await? {
                match ctx.store().get(ctx.collection(), &id).await? {
                    Some(entity) => println!(
                        "{id}  {} ({})  votos: {}  comentarios: {}",
                        entity.name,
                        entity.company,
                        entity.votes,
                        entity.comments.len()
                    ),
                    None => println!("{id}  <removed>"),
                }
            }
        }
        Command::Vote {
            email,
            password,
            id,
        } => {
            sign_in(&ctx, email, password).await?;
            let page = ctx.entity_page(EntityId::from(id.as_str()));
            page.load().await;
            match page.vote().await {
                Ok(MutationOutcome::Applied(entity)) => println!("votos: {}", entity.votes),
                Ok(MutationOutcome::Unchanged(_)) => println!("ya votaste por este producto"),
                Ok(MutationOutcome::LoginRequired) => bail!("inicia sesión para votar"),
                Err(err) => {
                    print_notices(&mut notices);
                    return Err(err.into());
                }
            }
        }
        Command::Comment {
            email,
            password,
            id,
            message,
        } => {
            sign_in(&ctx, email, password).await?;
            let page = ctx.entity_page(EntityId::from(id.as_str()));
            if !matches!(page.load().await, FetchState::Loaded(_)) {
                bail!("producto {id} no disponible");
            }
            let form = page.comment_form();
            form.controller().set_field(CommentField::Message, message);
            let outcome = form.submit().await;
            print_notices(&mut notices);
            finish(form, outcome)?;
            print_state(&page.state().await);
        }
    }

    Ok(())
}

async fn sign_in(ctx: &CatalogContext, email: String, password: String) -> Result<()> {
    let form = ctx.login_form();
    form.controller().set_field(LoginField::Email, email);
    form.controller().set_field(LoginField::Password, password);
    finish(&form, form.submit().await)
}

/// Turns a submit into an error when validation or the action failed.
fn finish<F: FormSchema>(form: &GatedForm<F>, outcome: SubmitOutcome<F>) -> Result<()> {
    match outcome {
        SubmitOutcome::Rejected(errors) => {
            let messages: Vec<String> = F::FIELDS
                .iter()
                .filter_map(|field| {
                    errors
                        .get(field)
                        .map(|msg| format!("{}: {msg}", field.name()))
                })
                .collect();
            bail!("{}", messages.join("; "))
        }
        SubmitOutcome::AlreadyPending => bail!("submit already in progress"),
        SubmitOutcome::Submitted => {
            if let Some(message) = form.form_error() {
                bail!(message);
            }
            if form.take_navigation() == Some(Navigation::Login) {
                bail!("inicia sesión para continuar");
            }
            Ok(())
        }
    }
}

fn print_state(state: &FetchState) {
    match state {
        FetchState::Loaded(entity) => print_entity(entity),
        FetchState::NotFound => println!("Producto no existente"),
        FetchState::Error(message) => println!("error: {message}"),
        FetchState::Uninitialized | FetchState::Loading => println!("cargando..."),
    }
}

fn print_entity(entity: &Entity) {
    println!("{} - {}", entity.name, entity.company);
    println!(
        "publicado {} por {}",
        entity.created_at.format("%Y-%m-%d %H:%M"),
        entity.creator.display_name
    );
    if !entity.image_url.is_empty() {
        println!("imagen: {}", entity.image_url);
    }
    println!("{}", entity.url);
    println!("{}", entity.description);
    println!("votos: {}", entity.votes);
    for comment in &entity.comments {
        let badge = if entity.is_creator(&comment.author_id) {
            " [creador]"
        } else {
            ""
        };
        println!("  {}{badge}: {}", comment.author_name, comment.message);
    }
}

fn print_notices(notices: &mut broadcast::Receiver<ClientEvent>) {
    while let Ok(event) = notices.try_recv() {
        if let ClientEvent::Notice(message) = event {
            eprintln!("{message}");
        }
    }
}
