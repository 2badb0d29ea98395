use nablijven_core::models::{DayOfWeek, Student};
use nablijven_core::util::new_record_id;

use crate::commands::common::{
    describe_write, format_student_lines, print_json, report_source, AppContext,
};
use crate::error::CliError;

pub async fn run_student_add(
    context: &AppContext,
    name: &str,
    grade: &str,
    day: DayOfWeek,
    id: Option<String>,
) -> Result<Student, CliError> {
    let student = Student::new(
        id.unwrap_or_else(|| new_record_id("student")),
        name.trim(),
        grade.trim(),
        day,
    );
    let receipt = context.records.save_student(&student).await?;
    println!(
        "{}",
        describe_write(&format!("Saved student {}", student.display_label()), &receipt)
    );
    Ok(student)
}

pub async fn run_student_list(
    context: &AppContext,
    day: Option<DayOfWeek>,
    as_json: bool,
) -> Result<(), CliError> {
    let listing = context.records.students(day).await?;
    report_source(listing.source);

    if as_json {
        return print_json(&listing.records);
    }
    if listing.records.is_empty() {
        println!("No students found.");
    }
    for line in format_student_lines(&listing.records) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_student_delete(context: &AppContext, id: &str) -> Result<(), CliError> {
    let receipt = context.records.delete_student(id.trim()).await?;
    println!(
        "{}",
        describe_write(&format!("Deleted student {}", id.trim()), &receipt)
    );
    Ok(())
}
