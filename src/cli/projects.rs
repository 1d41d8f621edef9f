use std::{
    io::{self, Write},
    path::Path,
};

use ansi_term::Style;
use anyhow::Result;
use chrono::Local;

use crate::{
    tracker::storage::{
        entities::ProjectRecord,
        project_store::{JsonProjectStorage, ProjectStore},
        PROJECTS_FILE,
    },
    utils::time::format_minutes,
};

/// Command to process `projects` command. Lists every tracked project, most time first.
pub async fn print_projects(dir: &Path) -> Result<()> {
    let store = ProjectStore::open(JsonProjectStorage::new(dir.join(PROJECTS_FILE))).await;
    let mut stdout = io::stdout().lock();
    write_projects(&mut stdout, store.records())?;
    Ok(())
}

pub fn write_projects(output: &mut impl Write, records: &[ProjectRecord]) -> io::Result<()> {
    if records.is_empty() {
        return writeln!(output, "No projects tracked yet");
    }

    let mut records = records.iter().collect::<Vec<_>>();
    records.sort_by(|a, b| b.total_minutes.total_cmp(&a.total_minutes));

    let rows = records
        .iter()
        .map(|record| {
            [
                record.display_name.to_string(),
                format_minutes(record.total_minutes),
                record
                    .last_opened
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M")
                    .to_string(),
                record.project_id.to_string(),
            ]
        })
        .collect::<Vec<_>>();

    let header = ["PROJECT", "TOTAL", "LAST OPENED", "ID"];
    let mut widths = header.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let bold = Style::new().bold();
    let header_line = format_row(&header.map(str::to_owned), &widths);
    writeln!(output, "{}", bold.paint(header_line))?;
    for row in &rows {
        writeln!(output, "{}", format_row(row, &widths))?;
    }
    Ok(())
}

fn format_row(cells: &[String; 4], widths: &[usize; 4]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_owned()
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{TimeZone, Utc};

    use crate::tracker::storage::entities::ProjectRecord;

    use super::write_projects;

    #[test]
    fn test_empty_store() -> Result<()> {
        let mut output = Vec::new();
        write_projects(&mut output, &[])?;
        assert_eq!(String::from_utf8(output)?, "No projects tracked yet\n");
        Ok(())
    }

    #[test]
    fn test_most_time_first() -> Result<()> {
        let opened = Utc.with_ymd_and_hms(2018, 7, 4, 9, 0, 0).unwrap();
        let records = [
            ProjectRecord {
                project_id: "git@x/small.git".into(),
                display_name: "small".into(),
                total_minutes: 5.,
                last_opened: opened,
            },
            ProjectRecord {
                project_id: "git@x/big.git".into(),
                display_name: "big".into(),
                total_minutes: 184.,
                last_opened: opened,
            },
        ];

        let mut output = Vec::new();
        write_projects(&mut output, &records)?;
        let output = String::from_utf8(output)?;
        let lines = output.lines().collect::<Vec<_>>();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("PROJECT"));
        assert!(lines[1].starts_with("big "));
        assert!(lines[1].contains("3h 04m"));
        assert!(lines[1].ends_with("git@x/big.git"));
        assert!(lines[2].starts_with("small "));
        Ok(())
    }
}
