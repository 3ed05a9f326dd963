use anyhow::Result;
use tabled::{Table, Tabled, settings::Style};

use stride_core::db::Database;

pub(crate) fn cmd_user_add(db: &Database, username: &str, json: bool) -> Result<()> {
    let user = db.create_user(username)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        println!("Created user '{}' (ID: {})", user.username, user.id);
    }

    Ok(())
}

pub(crate) fn cmd_sport_list(db: &Database, json: bool) -> Result<()> {
    let sports = db.list_sports()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sports)?);
        return Ok(());
    }

    #[derive(Tabled)]
    struct SportRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Sport")]
        label: String,
        #[tabled(rename = "Active")]
        active: &'static str,
    }

    let rows: Vec<SportRow> = sports
        .into_iter()
        .map(|s| SportRow {
            id: s.id,
            label: s.label,
            active: if s.is_active { "yes" } else { "no" },
        })
        .collect();
    println!("{}", Table::new(&rows).with(Style::rounded()));

    Ok(())
}
