//! Logical field → accepted column names
//!
//! The remote directory is edited by hand, so the same logical field shows
//! up under several headers. Resolution walks the aliases in order and
//! takes the first one present on the row. Aliases are stored lower-case
//! and trimmed, matching how rows normalise their keys.

/// A field the mapper understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Identifier
    Id,
    /// Display name
    Name,
    /// Login PIN
    Secret,
    /// Rank label
    Rank,
    /// Access level / position
    AccessLevel,
    /// Avatar
    PhotoUrl,
    /// Membership status
    Status,
    /// Scripture points
    Biblical,
    /// Notes / participation points
    Participatory,
    /// Leadership points
    Leadership,
    /// Completed certificates
    Certificates,
    /// Platform credential handle
    BiometricCredential,
    /// Read / deleted notification ids
    NotificationPrefs,
    /// Last attendance mark
    LastAttendance,
    /// Security question
    SecurityQuestion,
    /// Security answer
    SecurityAnswer,
    /// Forced PIN change flag
    MustChangeSecret,
}

/// The alias table, in resolution order per field
pub const ALIASES: &[(Field, &[&str])] = &[
    (Field::Id, &["id", "id cédula", "cedula", "identificación", "id cedula"]),
    (Field::Name, &["name", "nombre", "nombre completo"]),
    (
        Field::Secret,
        &["pin", "contraseña/pin", "password", "acceso", "pin de acceso"],
    ),
    (Field::Rank, &["rank", "rango"]),
    (
        Field::AccessLevel,
        &["accesslevel", "nivel de acceso", "cargo", "rol"],
    ),
    (Field::PhotoUrl, &["photourl", "foto", "imagen", "foto url"]),
    (Field::Status, &["status", "estado"]),
    (Field::Biblical, &["bible", "biblia", "puntos biblia"]),
    (
        Field::Participatory,
        &["notes", "apuntes", "puntos apuntes", "libretas"],
    ),
    (Field::Leadership, &["leadership", "liderazgo", "puntos liderazgo"]),
    (Field::Certificates, &["certificates", "certificados", "certs"]),
    (
        Field::BiometricCredential,
        &["biometriccredential", "biometric_credential", "biometric"],
    ),
    (
        Field::NotificationPrefs,
        &["notifprefs", "notif_prefs", "notification_prefs"],
    ),
    (
        Field::LastAttendance,
        &["lastattendance", "last_attendance", "ultima asistencia"],
    ),
    (
        Field::SecurityQuestion,
        &["securityquestion", "pregunta_seguridad", "pregunta"],
    ),
    (
        Field::SecurityAnswer,
        &["securityanswer", "respuesta_seguridad", "respuesta"],
    ),
    (
        Field::MustChangeSecret,
        &["mustchangepassword", "cambio_obligatorio_pin", "cambio"],
    ),
];

impl Field {
    /// Accepted column names, most specific first
    #[must_use]
    pub fn aliases(self) -> &'static [&'static str] {
        ALIASES
            .iter()
            .find(|(field, _)| *field == self)
            .map_or(&[], |(_, aliases)| *aliases)
    }
}
