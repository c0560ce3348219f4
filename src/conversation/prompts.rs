//! Outbound texts. The bot talks to students in Spanish.

use super::model::{ReportData, RowError};
use super::state::Step;

pub const HELP: &str = "👋 ¡Hola! Soy Jarvis.\n\n\
    Comandos disponibles:\n\
    📝 /nuevo - Iniciar un nuevo reporte.\n\
    ⚙️ /configurar - Guardar grupo e integrantes fijos.\n\
    📂 /archivos - Listar archivos guardados.\n\
    ❌ /cancelar - Cancelar el proceso actual.";

pub const REPORT_INTRO: &str = "Vamos a crear el reporte.";
pub const CANCELLED: &str = "Operación cancelada.";
pub const CONFIG_SAVED: &str = "✅ Configuración guardada. Usa /nuevo para empezar.";
pub const CONFIG_SAVE_FAILED: &str =
    "❌ No se pudo guardar la configuración. Intenta de nuevo con /configurar.";
pub const GENERATION_IN_PROGRESS: &str =
    "⏳ Tu reporte se está generando. Espera a que termine.";
pub const GENERATION_STARTED: &str = "✅ Datos completados. Generando PDF...";
pub const REPORT_CAPTION: &str = "Aquí tienes el reporte editado y convertido a PDF.";
pub const REPORT_FILE_NAME: &str = "Reporte_Generado.pdf";
pub const CHART_STARTED: &str = "📊 Generando gráfica...";
pub const CHART_CAPTION: &str = "Así se ve tu gráfica.";
pub const CHART_FAILED: &str = "⚠️ No se pudo generar la gráfica, pero continuamos.";
pub const PHOTO_RECEIVED: &str = "📸 Foto recibida.";
pub const PHOTO_FAILED: &str =
    "⚠️ No se pudo descargar la foto. Envíala de nuevo o escribe 'no' para saltar.";
pub const NO_VARIABLES: &str =
    "❌ Define al menos una variable. Ejemplo: 'Voltaje (V), Corriente (A)'";
pub const NO_FILES: &str = "📂 No hay archivos guardados.";

/// The question asked when a session enters `step`.
pub fn step_prompt(step: Step, data: &ReportData) -> String {
    match step {
        Step::ConfigGroup => {
            "⚙️ Configuración de Chat.\n\nIngresa el número de GRUPO por defecto:".into()
        }
        Step::ConfigMembers => "Ingresa los INTEGRANTES fijos (separados por comas):".into(),
        Step::MemberRemoval => format!(
            "📋 Configuración cargada:\nGrupo: {}\nIntegrantes: {}\n\n\
             ¿Deseas ELIMINAR a alguien para este informe? \
             Escribe el nombre o 'no' para continuar.",
            data.group, data.members
        ),
        Step::Title => "1. ¿Cuál es el TÍTULO de la práctica?".into(),
        Step::Group => "2. ¿Cuál es el número de GRUPO (ej: NN(1-7))?".into(),
        Step::Members => "3. Nombres de los INTEGRANTES (separados por comas):".into(),
        Step::Summary => "4. Escribe el RESUMEN (máximo 5 líneas):".into(),
        Step::Introduction => "5. Escribe la INTRODUCCIÓN:".into(),
        Step::Objectives => "6. Escribe los OBJETIVOS (en lista):".into(),
        Step::Framework => "7. Escribe el MARCO TEÓRICO:".into(),
        Step::MethodologyIntro => "8.1 METODOLOGÍA - Introducción (Máx 5 líneas):".into(),
        Step::Materials => "8.2 Materiales y Equipos (Lista con marcas/detalles):".into(),
        Step::Setup => "8.3 Montaje Experimental (Descripción o referencia a figuras):".into(),
        Step::Procedure => "8.4 Procedimiento (Pasos realizados):".into(),
        Step::Variables => "🧪 9. EXPERIMENTO: Vamos a graficar.\n\
             Define las variables (Eje X, Eje Y) separadas por coma.\n\
             Ejemplo: 'Voltaje (V), Corriente (A)'"
            .into(),
        Step::Data => format!(
            "Ingresa los datos para: {}.\n\n\
             Escribe los valores separados por coma (ej: '1.5, 0.2').\n\
             Escribe 'fin' cuando termines.",
            data.variables.join(" vs ")
        ),
        Step::MontagePhoto => {
            "📸 Envía una FOTO del montaje experimental (o escribe 'no' para saltar):".into()
        }
        Step::Analysis => "10. Escribe el ANÁLISIS DE RESULTADOS:".into(),
        Step::Conclusions => "11. Escribe las CONCLUSIONES:".into(),
        Step::References => "12. Finalmente, escribe las REFERENCIAS:".into(),
        Step::Generating => GENERATION_IN_PROGRESS.into(),
    }
}

pub fn members_updated(members: &str) -> String {
    format!("Integrantes actualizados: {members}")
}

pub fn invalid_row(err: &RowError) -> String {
    match err {
        RowError::NotANumber(_) => {
            "❌ Formato inválido. Usa números separados por coma (ej: 10.5, 20).".into()
        }
        RowError::Arity { expected, got } => format!(
            "❌ Se esperaban {expected} valores (uno por variable) y se recibieron {got}."
        ),
    }
}

pub fn generation_failed(reason: &str) -> String {
    format!("❌ Error generando el reporte: {reason}")
}
