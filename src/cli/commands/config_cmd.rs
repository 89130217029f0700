//! Domain selector configuration commands.

use clap::Subcommand;
use console::style;

use crate::config::Settings;
use crate::selectors::{Field, SelectorRule, SelectorStore};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective settings file path and data directories
    Path,
    /// Show the selector configuration for a domain
    Show {
        /// Domain to show (e.g. shop.example.com)
        domain: String,
    },
    /// Prepend a selector rule for a field on a domain
    AddRule {
        domain: String,
        /// Field: title, price, identifier, image, url, nextPage, productContainer
        field: String,
        /// CSS selector
        selector: String,
        /// Read this attribute instead of text content
        #[arg(long)]
        attribute: Option<String>,
        /// Post-process regex; the first capture group is the value
        #[arg(long)]
        pattern: Option<String>,
    },
    /// Set the pagination URL pattern ({page} placeholder) for a domain
    SetPagination {
        domain: String,
        pattern: String,
    },
}

pub async fn cmd_config(settings: &Settings, action: ConfigAction) -> anyhow::Result<()> {
    let store = SelectorStore::new(settings.domains_dir());

    match action {
        ConfigAction::Path => {
            println!("config file: {}", Settings::config_path().display());
            println!("data dir:    {}", settings.data_dir().display());
            println!("domains:     {}", settings.domains_dir().display());
            println!("history:     {}", settings.history_dir().display());
            println!("cache:       {}", settings.cache_dir().display());
        }
        ConfigAction::Show { domain } => {
            let config = store.get(&domain).await;
            println!("{}", serde_json::to_string_pretty(&*config)?);
        }
        ConfigAction::AddRule {
            domain,
            field,
            selector,
            attribute,
            pattern,
        } => {
            let field = parse_field(&field)?;
            let mut rule = SelectorRule::new(&selector);
            rule.attribute = attribute;
            rule.post_process = pattern;
            if !rule.is_valid() {
                anyhow::bail!("invalid rule: empty selector or broken pattern");
            }

            store
                .update(&domain, |config| {
                    config.merge_prepend(field, vec![rule]);
                })
                .await?;
            println!(
                "{} Rule added for {} on {}",
                style("✓").green(),
                field_name(field),
                domain
            );
        }
        ConfigAction::SetPagination { domain, pattern } => {
            if !pattern.contains("{page}") {
                anyhow::bail!("pagination pattern must contain a {{page}} placeholder");
            }
            store
                .update(&domain, |config| {
                    config.pagination_pattern = Some(pattern.clone());
                })
                .await?;
            println!("{} Pagination pattern set for {}", style("✓").green(), domain);
        }
    }

    Ok(())
}

fn parse_field(raw: &str) -> anyhow::Result<Field> {
    match raw.to_lowercase().as_str() {
        "title" => Ok(Field::Title),
        "price" => Ok(Field::Price),
        "identifier" => Ok(Field::Identifier),
        "image" => Ok(Field::Image),
        "url" => Ok(Field::Url),
        "nextpage" | "next_page" | "next-page" => Ok(Field::NextPage),
        "productcontainer" | "product_container" | "container" => Ok(Field::ProductContainer),
        other => anyhow::bail!("unknown field {:?}", other),
    }
}

fn field_name(field: Field) -> &'static str {
    match field {
        Field::Title => "title",
        Field::Price => "price",
        Field::Identifier => "identifier",
        Field::Image => "image",
        Field::Url => "url",
        Field::NextPage => "nextPage",
        Field::ProductContainer => "productContainer",
    }
}
