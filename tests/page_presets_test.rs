use std::collections::BTreeMap;
use std::sync::Arc;

use xenergy_cleaner::domain::Value;
use xenergy_cleaner::pipeline::export::OutputFormat;
use xenergy_cleaner::pipeline::ingestion::InputFile;
use xenergy_cleaner::pipeline::processing::matching::{
    CanonicalEntry, MatchDecision, ReferenceVocabulary,
};
use xenergy_cleaner::pipeline::processing::validation::RowStatus;
use xenergy_cleaner::{PageRegistry, PipelineConfig, PipelineOutput, PipelineRun};

fn page(id: &str) -> PipelineConfig {
    PageRegistry::new().load(id).unwrap()
}

fn run_page(config: PipelineConfig, name: &str, text: &str) -> PipelineOutput {
    PipelineRun::new(Arc::new(config))
        .execute(&[InputFile::new(name, text.as_bytes().to_vec())])
        .unwrap()
}

fn cell<'a>(output: &'a PipelineOutput, row: usize, column: &str) -> &'a Value {
    let idx = output.table.column_index(column).unwrap();
    output.table.get(row, idx).unwrap()
}

#[test]
fn test_dgm_qaqc_rejects_bad_rows() {
    let mut config = page("dgm_qaqc");
    config.export.format = "csv".into();
    let output = run_page(
        config,
        "dgm.csv",
        "Blast,Borehole,Density,Local X (Design),Local Y (Design),Hole Length (Design),Hole Length (Actual),Explosive (kg) (Design),Explosive (kg) (Actual),Asset ID\n\
         F03B2890,401,1.2,100,200,15,0,300,310,CAT-266\n\
         F03B2890,402,-,100,200,15,15,300,310,CAT-266\n\
         F03B2890,403,1.2,-5,200,15,15,300,310,CAT-266\n\
         F03B2890,404,1.2,100,200,0,0,300,310,CAT-266\n",
    );

    assert_eq!(
        output.validation.row_status,
        vec![
            RowStatus::Clean,
            RowStatus::Rejected,
            RowStatus::Rejected,
            RowStatus::Rejected
        ]
    );
    assert_eq!(output.report.validation.clean, 1);
    assert_eq!(output.report.validation.rejected, 3);
    // zero actual length takes the design value
    assert_eq!(cell(&output, 0, "Hole Length (Actual)"), &Value::Number(15.0));
    assert_eq!(cell(&output, 3, "Hole Length (Design)"), &Value::Null);

    assert_eq!(output.export.file_name, "DGM_QAQC_Cleaned.csv");
    assert_eq!(output.export.format, OutputFormat::Csv);
    let text = String::from_utf8(output.export.bytes).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1], "F03B2890,401,1.2,100,200,15,15,300,310,266,clean,");
}

#[test]
fn test_es_qaqc_borehole_codes_and_date_range() {
    let output = run_page(
        page("es_qaqc"),
        "es.csv",
        "Fecha;Borehole;Density;Local X (Design);Local Y (Design);Hole Length (Design);Hole Length (Actual);Explosive (kg) (Design);Explosive (kg) (Actual)\n\
         2024-01-20;B_402;1.1;10;20;15;15;100;100\n\
         2024-01-05;C7;1.1;10;20;15;;100;\n\
         2024-02-10;Aux1;1.1;10;20;15;15;100;100\n\
         2024-02-11;D9;0;10;20;15;15;100;100\n",
    );

    assert_eq!(cell(&output, 0, "Borehole"), &Value::text("402"));
    assert_eq!(cell(&output, 1, "Borehole"), &Value::text("2000007"));
    assert_eq!(cell(&output, 1, "Hole Length (Actual)"), &Value::Number(15.0));
    assert_eq!(
        output.validation.row_status,
        vec![
            RowStatus::Clean,
            RowStatus::Clean,
            RowStatus::Rejected,
            RowStatus::Rejected
        ]
    );
    let rejected_by: Vec<&str> = output
        .validation
        .issues
        .iter()
        .map(|i| i.rule_id.as_str())
        .collect();
    assert_eq!(rejected_by, vec!["density_positive", "no_aux"]);

    // date range covers only the exported rows
    assert_eq!(output.export.file_name, "ES_QAQC_050124_200124.csv");
    let text = String::from_utf8(output.export.bytes).unwrap();
    assert_eq!(text.lines().count(), 3);
    assert!(text.starts_with("Fecha;Borehole;Density;"));
}

#[test]
fn test_mb_auto_operator_codes() {
    let output = run_page(
        page("mb_auto"),
        "mb.csv",
        "Grupo,Turno,Fase,Tipo Pozo,Modelo,Operador,Coord X,Coord Y,Cota\n\
         G_2,TA,F05,Produccion,793F,Jorge Muñoz V.,100,200,300\n\
         G3,TB,F6,Buffer,,YASNA MENA,101,201,301\n\
         G1,TA,F7,Auxiliar,5310,Desconocido Perez,102,202,302\n",
    );

    let results = &output.matches[0].results;
    assert_eq!(output.matches[0].column, "Operador");
    let codes: Vec<Option<i64>> = results.iter().map(|r| r.code).collect();
    assert_eq!(codes, vec![Some(25), Some(46), Some(47)]);
    assert_eq!(results[0].decision, MatchDecision::Accepted);
    assert_eq!(results[1].canonical.as_deref(), Some("Yasna Mena"));
    assert_eq!(results[2].decision, MatchDecision::Review);
    assert_eq!(cell(&output, 2, "Operador_code"), &Value::Number(47.0));

    assert_eq!(cell(&output, 0, "Grupo"), &Value::Number(2.0));
    assert_eq!(cell(&output, 1, "Turno"), &Value::Number(2.0));
    assert_eq!(cell(&output, 0, "Fase"), &Value::text("05"));
    assert_eq!(cell(&output, 0, "Tipo Pozo"), &Value::Number(1.0));
    assert_eq!(cell(&output, 0, "Modelo"), &Value::text("79"));
    assert_eq!(cell(&output, 1, "Modelo"), &Value::text("53"));
    assert_eq!(cell(&output, 2, "Modelo"), &Value::text("53"));

    assert_eq!(
        output.validation.row_status,
        vec![RowStatus::Clean, RowStatus::Clean, RowStatus::Rejected]
    );
    assert_eq!(output.export.file_name, "MB_Autonomia_Cleaned.xlsx");
    assert_eq!(output.export.rows, 2);
}

#[test]
fn test_dgm_auto_assigns_new_operator_codes() {
    let output = run_page(
        page("dgm_auto"),
        "dgm_auto.csv",
        "Operador,Turno,Banco,Dia\n\
         Jose Perez,Día,F12W_B2890,2024-03-05\n\
         JOSÉ PÉREZ,Noche,F05-B02890,2024-03-06\n\
         ,Noche,,\n\
         Raul Soto,Noche,F05_3010_X,2024-03-06\n\
         Raúl Soto,Noche,F5,2024-03-07\n\
         Zzyzx Qwerty,Noche,F7,2024-03-07\n\
         Jose Peres,Día,F7,2024-03-08\n",
    );

    let results = &output.matches[0].results;
    let codes: Vec<Option<i64>> = results.iter().map(|r| r.code).collect();
    assert_eq!(
        codes,
        vec![Some(13), Some(13), Some(25), Some(38), Some(38), Some(39), Some(40)]
    );
    // a fuzzy score of 0.89 is below the 0.9 fuzzy bar
    assert_eq!(results[6].canonical.as_deref(), Some("Jose Perez"));
    assert_eq!(results[6].decision, MatchDecision::Review);
    let expected: BTreeMap<String, i64> = [
        ("Raul Soto".to_string(), 38),
        ("Zzyzx Qwerty".to_string(), 39),
        ("Jose Peres".to_string(), 40),
    ]
    .into_iter()
    .collect();
    assert_eq!(output.report.matching[0].new_codes, expected);
    assert_eq!(output.report.matching[0].accepted, 2);
    assert_eq!(output.report.matching[0].empty, 1);

    assert_eq!(cell(&output, 0, "Turno"), &Value::Number(1.0));
    assert_eq!(cell(&output, 1, "Turno"), &Value::Number(2.0));
    assert_eq!(cell(&output, 0, "Expansion"), &Value::Number(120.0));
    assert_eq!(cell(&output, 1, "Expansion"), &Value::Number(5.0));
    assert_eq!(cell(&output, 0, "Nivel"), &Value::Number(2890.0));
    assert_eq!(cell(&output, 3, "Nivel"), &Value::Number(3010.0));
    assert_eq!(cell(&output, 2, "Nivel"), &Value::Null);
    assert_eq!(cell(&output, 0, "Day"), &Value::Number(5.0));
    assert_eq!(cell(&output, 0, "Month"), &Value::Number(3.0));
    assert_eq!(cell(&output, 0, "Year"), &Value::Number(2024.0));
    assert_eq!(
        &output.table.columns()[..5],
        &["Operador", "Turno", "Banco", "Expansion", "Nivel"]
    );

    // pair rules have no columns to check in this sheet
    assert!(output
        .report
        .warnings()
        .any(|n| n.message.contains("Rule 'este' skipped")));
    assert_eq!(output.export.rows, 7);

    let txt = &output.extra_exports[0];
    assert_eq!(txt.file_name, "DGM_Autonomia_Cleaned.txt");
    let text = String::from_utf8(txt.bytes.clone()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Operador\tExpansion\tDay\tMonth\tYear");
    assert_eq!(lines[1], "13\t120\t5\t3\t2024");
    assert_eq!(lines[3], "25\t\t\t\t");

    let updated = output.vocabulary_export.as_ref().unwrap();
    assert_eq!(updated.file_name, "DGM_Operators_Updated.xlsx");
    assert_eq!(updated.rows, 38);
    assert!(updated.bytes.starts_with(b"PK\x03\x04"));
}

#[test]
fn test_mb_qaqc_fills_pairs_and_splits_blast() {
    let output = run_page(
        page("mb_qaqc"),
        "mb.csv",
        "Blast,Borehole,Density,Local X (Design),Local Y (Design),Hole Length (Design),Hole Length (Actual),Explosive (kg) (Design),Explosive (kg) (Actual),Asset\n\
         F07_2890_01,1,1.3,10,20,15,,300,,CAT-07\n\
         F07_2890_01,2,0,10,20,15,15,300,300,CAT-07\n\
         F07_2890_01,3,1.3,-1,20,15,15,300,300,CAT-07\n\
         F07_2890_01,4,1.3,10,20,,,300,300,CAT-07\n",
    );

    assert_eq!(
        &output.table.columns()[..4],
        &["Blast", "Fase", "Block", "Borehole"]
    );
    assert_eq!(cell(&output, 0, "Fase"), &Value::text("07"));
    assert_eq!(cell(&output, 0, "Block"), &Value::text("2890"));
    assert_eq!(cell(&output, 0, "Hole Length (Actual)"), &Value::Number(15.0));
    assert_eq!(cell(&output, 0, "Explosive (kg) (Actual)"), &Value::Number(300.0));
    assert_eq!(cell(&output, 0, "Asset"), &Value::Number(7.0));
    assert_eq!(cell(&output, 1, "Density"), &Value::Null);
    assert_eq!(
        output.validation.row_status,
        vec![
            RowStatus::Clean,
            RowStatus::Rejected,
            RowStatus::Rejected,
            RowStatus::Rejected
        ]
    );

    assert_eq!(output.export.file_name, "MB_QAQC_Cleaned.xlsx");
    assert_eq!(output.export.rows, 1);
    let csv = &output.extra_exports[0];
    assert_eq!(csv.file_name, "MB_QAQC_Cleaned.csv");
    let text = String::from_utf8(csv.bytes.clone()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1], "F07_2890_01,07,2890,1,1.3,10,20,15,15,300,300,7,clean,");
}

#[test]
fn test_mb_frag_codes_classes_and_estimates_d20() {
    let output = run_page(
        page("mb_frag"),
        "frag.csv",
        "Fecha fotografias,Fase,Banco,Equipo,MINERALIZACION,LITOLOGIA,Ref. Pozo,Ref. X,Ref. Y,Ref. Z,D20,D50,n\n\
         2024-05-01,F07,2890,PA_02,Mineral,Andesita Basal,P1,100,200,2890,-,10,1.2\n\
         2024-05-01,F7,2890,PA02, lastre ,Andesita,P2,101,201,2890,4,8,1.1\n\
         2024-05-01,F7,2890,PA02,Oro,Andesitas Superiores,P3,102,202,2890,,-,1\n\
         2024-05-01,F7,2890,PA02,Marginal,Pórfido,P4,,203,2890,3,6,1\n",
    );

    assert_eq!(cell(&output, 0, "Fase"), &Value::Number(7.0));
    assert_eq!(cell(&output, 0, "Equipo"), &Value::Number(2.0));
    let minerals: Vec<&Value> = (0..4).map(|r| cell(&output, r, "MINERALIZACION")).collect();
    assert_eq!(
        minerals,
        vec![
            &Value::Number(1.0),
            &Value::Number(2.0),
            &Value::Null,
            &Value::Number(3.0)
        ]
    );
    let lithology: Vec<&Value> = (0..4).map(|r| cell(&output, r, "LITOLOGIA")).collect();
    assert_eq!(
        lithology,
        vec![
            &Value::Number(1.0),
            &Value::Number(4.0),
            &Value::Number(3.0),
            &Value::Null
        ]
    );
    // half of D50 when D20 is missing
    assert_eq!(cell(&output, 0, "D20"), &Value::Number(5.0));
    assert_eq!(cell(&output, 1, "D20"), &Value::Number(4.0));
    assert_eq!(cell(&output, 2, "D20"), &Value::Null);
    assert_eq!(
        output.validation.row_status[3],
        RowStatus::Rejected
    );

    assert_eq!(output.export.file_name, "MB_FRAG_Cleaned.xlsx");
    assert_eq!(output.export.rows, 3);
    let text = String::from_utf8(output.extra_exports[0].bytes.clone()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "Fecha fotografias,Fase,Banco,Equipo,MINERALIZACION,LITOLOGIA,Pozo,X,Y,Z,D20,D50,n"
    );
    assert_eq!(lines[1], "2024-05-01,7,2890,2,1,1,P1,100,200,2890,5,10,1.2");
    assert_eq!(lines[3], "2024-05-01,7,2890,2,,3,P3,102,202,2890,,,1");
    assert_eq!(lines.len(), 4);
}

#[test]
fn test_dgm_frag_splits_dates_and_keeps_known_shovels() {
    let output = run_page(
        page("dgm_frag"),
        "frag.csv",
        "Fecha Medicion;ID Tronadura;PALA;P50;P80;% Pasante 2 pulgadas\n\
         05/03/2024;F12_2595_01;PA_01;3.1;6.2;85\n\
         06/03/2024;F-05-2610;2;3;6;80\n\
         07/03/2024;F12_2595_02;PA_03;3;6;80\n\
         07/03/2024;F12_2595_02;;3;6;80\n",
    );

    assert_eq!(cell(&output, 0, "Day"), &Value::Number(5.0));
    assert_eq!(cell(&output, 0, "Month"), &Value::Number(3.0));
    assert_eq!(cell(&output, 0, "Year"), &Value::Number(2024.0));
    assert_eq!(cell(&output, 0, "Expansion"), &Value::Number(12.0));
    assert_eq!(cell(&output, 1, "Expansion"), &Value::Number(5.0));
    assert_eq!(cell(&output, 1, "Level"), &Value::Number(2610.0));
    assert_eq!(cell(&output, 0, "PALA"), &Value::Number(1.0));
    assert_eq!(
        output.validation.row_status,
        vec![
            RowStatus::Clean,
            RowStatus::Clean,
            RowStatus::Rejected,
            RowStatus::Rejected
        ]
    );

    assert_eq!(output.export.file_name, "DGM_Fragmentation_Output.xlsx");
    assert_eq!(output.export.rows, 2);
    let csv = &output.extra_exports[0];
    assert_eq!(csv.file_name, "DGM_Fragmentation_Output.csv");
    let text = String::from_utf8(csv.bytes.clone()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("Day;Month;Year;Expansion;Level;PALA;"));
    assert_eq!(lines[1], "5;3;2024;12;2595;1;3.1;6.2;85");
    assert_eq!(lines[2], "6;3;2024;5;2610;2;3;6;80");
}

#[test]
fn test_es_frag_pivots_readings() {
    let output = run_page(
        page("es_frag"),
        "frag.txt",
        "Data Source: shovel feed\n\
         Shovel65,P80,24/07/2025 00:01,5.64\n\
         Shovel65,P50,24/07/2025 00:01,2.1\n\
         Shovel65,Fino,24/07/2025 00:01,30\n\
         Shovel12,P80,24/07/2025 00:02,7.5\n\
         Shovel65,P80,24/07/2025 00:02,5.0\n\
         Shovel65,Temp,24/07/2025 00:02,40\n",
    );

    assert_eq!(
        output.table.columns(),
        &[
            "Number",
            "Day",
            "Month",
            "Year",
            "Hour",
            "Minute",
            "P80",
            "P50",
            "P20",
            "Grueso",
            "Intermedio",
            "Fino"
        ]
    );
    assert_eq!(output.table.row_count(), 3);
    assert_eq!(cell(&output, 0, "Number"), &Value::Number(12.0));
    assert_eq!(cell(&output, 1, "P50"), &Value::Number(2.1));
    assert_eq!(cell(&output, 1, "Fino"), &Value::Number(30.0));
    assert_eq!(cell(&output, 2, "Minute"), &Value::Number(2.0));

    assert_eq!(output.export.file_name, "ES_Fragmentation_Cleaned.xlsx");
    let txt = &output.extra_exports[0];
    assert_eq!(txt.file_name, "ES_Fragmentation_Cleaned.txt");
    let text = String::from_utf8(txt.bytes.clone()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "Number\tDay\tMonth\tYear\tHour\tMinute\tP80\tP50\tP20\tGrueso\tIntermedio\tFino"
    );
    assert_eq!(lines[1], "12\t24\t7\t2025\t0\t2\t7.5\t\t\t\t\t");
    assert_eq!(lines[2], "65\t24\t7\t2025\t0\t1\t5.64\t2.1\t\t\t\t30");
}

#[test]
fn test_es_auto_with_supplied_operators() {
    let vocabulary = ReferenceVocabulary::new([
        CanonicalEntry {
            name: "Juan Perez".into(),
            code: Some(7),
        },
        CanonicalEntry {
            name: "Ana Rojas".into(),
            code: Some(9),
        },
    ]);
    let input = "Perforadora,turno (dia o noche),Coordinacion,Malla,Pozo,Coordenadas diseño X,Coordenadas diseño Y,Coordenadas diseño Z,Coordenada real inicioX,Coordenada real inicio Y,Coordena real inicio Z,Largo de pozo real,Categoria de pozo,Operador,Modo de perforacion\n\
         PE_07,Dia,A,2890-F12-P0451,B12,,500,2900,150000,,,15,Produccion,Juan Perez,Autonomous\n\
         PE_07,Noche,B,2890-F12-P0452,Aux3,150000,500,2900,,,,15,Buffer,,Manual\n\
         PE_08,Noche,C,2905-F5-0453,D9,90000,500,2900,,,,15,Auxiliar,Pedro Soto,Teleremote\n\
         PE_08,Dia,D,2905-F5-0454,C7,150000,500,2900,,,,0,Produccion,JUAN PÉREZ,Manual\n";
    let output = PipelineRun::new(Arc::new(page("es_auto")))
        .with_vocabulary(Arc::new(vocabulary))
        .execute(&[InputFile::new("es_auto.csv", input.as_bytes().to_vec())])
        .unwrap();

    let codes: Vec<Option<i64>> = output.matches[0].results.iter().map(|r| r.code).collect();
    assert_eq!(codes, vec![Some(7), Some(110), Some(10), Some(7)]);
    assert_eq!(cell(&output, 0, "Operador_code"), &Value::Number(7.0));

    assert_eq!(
        &output.table.columns()[..6],
        &["Perforadora", "turno (dia o noche)", "Coordinacion", "Banco", "Expansion", "Malla"]
    );
    assert_eq!(cell(&output, 0, "Perforadora"), &Value::text("07"));
    assert_eq!(cell(&output, 0, "Banco"), &Value::Number(2890.0));
    assert_eq!(cell(&output, 2, "Expansion"), &Value::Number(5.0));
    assert_eq!(cell(&output, 0, "Malla"), &Value::text("0451"));
    assert_eq!(cell(&output, 0, "Pozo"), &Value::Number(10000012.0));
    assert_eq!(cell(&output, 1, "Pozo"), &Value::Null);
    assert_eq!(cell(&output, 2, "Pozo"), &Value::Number(9.0));
    assert_eq!(cell(&output, 3, "Pozo"), &Value::Number(2000007.0));
    assert_eq!(cell(&output, 0, "Coordenadas diseño X"), &Value::Number(150000.0));
    assert_eq!(cell(&output, 0, "Coordena real inicio Z"), &Value::Number(2900.0));
    assert_eq!(cell(&output, 2, "Categoria de pozo"), &Value::Number(3.0));
    assert_eq!(cell(&output, 0, "Modo de perforacion"), &Value::Number(2.0));

    assert_eq!(
        output.validation.row_status,
        vec![
            RowStatus::Clean,
            RowStatus::Rejected,
            RowStatus::Rejected,
            RowStatus::Rejected
        ]
    );
    assert_eq!(output.export.file_name, "Escondida_Autonomia_Cleaned.xlsx");
    assert_eq!(output.export.rows, 1);
    let text = String::from_utf8(output.extra_exports[0].bytes.clone()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("Perforadora,turno (dia o noche),Coordinacion,Banco,Expansion,MallaID,Pozo,"));
    assert!(lines[1].starts_with("07,1,1,2890,12,0451,10000012,"));
}

#[test]
fn test_es_auto_without_operators_fails_at_matching() {
    let err = PipelineRun::new(Arc::new(page("es_auto")))
        .execute(&[InputFile::new("es_auto.csv", b"Operador\nJuan Perez\n".to_vec())])
        .unwrap_err();
    assert_eq!(err.stage, xenergy_cleaner::Stage::Matching);
}
