use std::io::Write;
use tempfile::NamedTempFile;

pub fn seed_file(rows: &[&str]) -> NamedTempFile {
    file_with(
        "cuota, unidad, periodo, concepto, vencimiento, total, activa",
        rows,
    )
}

pub fn commands_file(rows: &[&str]) -> NamedTempFile {
    file_with("op, cuota, monto, medio, referencia, resultado", rows)
}

fn file_with(header: &str, rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{header}").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file
}
