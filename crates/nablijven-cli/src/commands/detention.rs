use nablijven_core::models::{DayOfWeek, Detention};
use nablijven_core::util::{is_iso_date, new_record_id, normalize_text_option};

use crate::cli::DetentionDetails;
use crate::commands::common::{
    describe_write, format_detention_lines, format_session_lines, print_json, report_source,
    AppContext,
};
use crate::error::CliError;

/// Required fields of `detention add`
pub struct NewDetention<'a> {
    pub date: &'a str,
    pub student: &'a str,
    pub day: Option<DayOfWeek>,
    pub number: Option<u32>,
}

/// Field changes of `detention update`
#[derive(Default)]
pub struct DetentionChanges {
    pub date: Option<String>,
    pub student: Option<String>,
    pub day: Option<DayOfWeek>,
    pub number: Option<u32>,
}

pub async fn run_detention_add(
    context: &AppContext,
    new: NewDetention<'_>,
    details: &DetentionDetails,
) -> Result<Detention, CliError> {
    let date = new.date.trim();
    ensure_date(date)?;
    let day = session_day(date, new.day)?;
    let number = match new.number {
        Some(number) => number,
        None => context.records.next_detention_number(date).await?,
    };

    let mut detention = Detention::new(
        new_record_id("detention"),
        number,
        date,
        day,
        new.student.trim(),
    );
    apply_details(&mut detention, details);

    let receipt = context.records.create_detention(&detention).await?;
    println!(
        "{}",
        describe_write(
            &format!(
                "Added #{} {} on {}",
                detention.number, detention.student, detention.date
            ),
            &receipt
        )
    );
    Ok(detention)
}

pub async fn run_detention_update(
    context: &AppContext,
    id: &str,
    changes: DetentionChanges,
    details: &DetentionDetails,
) -> Result<Detention, CliError> {
    let id = id.trim();
    let mut detention = context
        .records
        .detentions(None)
        .await?
        .records
        .into_iter()
        .find(|detention| detention.id == id)
        .ok_or_else(|| CliError::DetentionNotFound(id.to_string()))?;

    if let Some(date) = changes.date {
        let date = date.trim().to_string();
        ensure_date(&date)?;
        if changes.day.is_none() {
            detention.day_of_week = session_day(&date, None)?;
        }
        detention.date = date;
    }
    if let Some(day) = changes.day {
        detention.day_of_week = day;
    }
    if let Some(student) = changes.student {
        detention.student = student.trim().to_string();
    }
    if let Some(number) = changes.number {
        detention.number = number;
    }
    apply_details(&mut detention, details);

    let receipt = context.records.update_detention(&detention).await?;
    println!(
        "{}",
        describe_write(&format!("Updated detention {id}"), &receipt)
    );
    Ok(detention)
}

pub async fn run_detention_list(
    context: &AppContext,
    date: Option<&str>,
    range: Option<(&str, &str)>,
    as_json: bool,
) -> Result<(), CliError> {
    let listing = match range {
        Some((from, to)) => context.records.detentions_in_range(from, to).await?,
        None => context.records.detentions(date).await?,
    };
    report_source(listing.source);

    if as_json {
        return print_json(&listing.records);
    }
    if listing.records.is_empty() {
        println!("No detentions found.");
    }
    for line in format_detention_lines(&listing.records) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_detention_sessions(context: &AppContext, as_json: bool) -> Result<(), CliError> {
    let listing = context.records.sessions().await?;
    report_source(listing.source);

    if as_json {
        return print_json(&listing.records);
    }
    if listing.records.is_empty() {
        println!("No sessions found.");
    }
    for line in format_session_lines(&listing.records) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_detention_reorder(
    context: &AppContext,
    date: &str,
    ids: &[String],
) -> Result<(), CliError> {
    let changed = context.records.reorder_session(date.trim(), ids).await?;
    if changed == 0 {
        println!("Session {} already in this order", date.trim());
    } else {
        println!("Renumbered {changed} detention(s) on {}", date.trim());
    }
    Ok(())
}

pub async fn run_detention_duplicate(
    context: &AppContext,
    from: &str,
    to: &str,
) -> Result<Vec<Detention>, CliError> {
    let copies = context
        .records
        .duplicate_session(from.trim(), to.trim())
        .await?;
    println!(
        "Copied {} detention(s) from {} to {}",
        copies.len(),
        from.trim(),
        to.trim()
    );
    for line in format_detention_lines(&copies) {
        println!("{line}");
    }
    Ok(copies)
}

pub async fn run_detention_delete(context: &AppContext, id: &str) -> Result<(), CliError> {
    let receipt = context.records.delete_detention(id.trim()).await?;
    println!(
        "{}",
        describe_write(&format!("Deleted detention {}", id.trim()), &receipt)
    );
    Ok(())
}

/// Copy the optional fields that were given. Empty text clears a field.
pub fn apply_details(detention: &mut Detention, details: &DetentionDetails) {
    if let Some(teacher) = &details.teacher {
        detention.teacher = normalize_text_option(Some(teacher.clone()));
    }
    if let Some(reason) = &details.reason {
        detention.reason = normalize_text_option(Some(reason.clone()));
    }
    if let Some(task) = &details.task {
        detention.task = normalize_text_option(Some(task.clone()));
    }
    if let Some(lvs_date) = &details.lvs_date {
        detention.lvs_date = normalize_text_option(Some(lvs_date.clone()));
    }
    if let Some(notes) = &details.notes {
        detention.extra_notes = normalize_text_option(Some(notes.clone()));
    }
    if let Some(print) = details.print {
        detention.should_print = print;
    }
    if let Some(chromebook) = details.chromebook {
        detention.can_use_chromebook = chromebook;
    }
    if let Some(double_period) = details.double_period {
        detention.is_double_period = Some(double_period);
    }
    if let Some(period) = details.time_period {
        detention.time_period = Some(period);
    }
}

fn session_day(date: &str, explicit: Option<DayOfWeek>) -> Result<DayOfWeek, CliError> {
    explicit
        .or_else(|| DayOfWeek::for_date(date))
        .ok_or_else(|| CliError::UnknownSessionDay(date.to_string()))
}

fn ensure_date(date: &str) -> Result<(), CliError> {
    if is_iso_date(date) {
        Ok(())
    } else {
        Err(nablijven_core::Error::InvalidInput(format!("Date must be YYYY-MM-DD, got {date}")).into())
    }
}
