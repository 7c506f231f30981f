use std::fmt;

/// Role required to perform an action on a project or its documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Any user holding a participation row for the project (owner included).
    Participant,
    /// The user recorded as the project's owner.
    Owner,
}

/// Every operation that touches a project or a document attached to one.
/// The mapping to a required role lives here and nowhere else; handlers
/// dispatch through it instead of re-implementing checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectAction {
    ViewProject,
    UpdateProject,
    DeleteProject,
    GrantAccess,
    ListDocuments,
    UploadDocument,
    ViewDocument,
    DownloadDocument,
    UpdateDocument,
    DeleteDocument,
}

impl ProjectAction {
    #[must_use]
    pub const fn required_role(self) -> Role {
        match self {
            ProjectAction::ViewProject
            | ProjectAction::UpdateProject
            | ProjectAction::ListDocuments
            | ProjectAction::UploadDocument
            | ProjectAction::ViewDocument
            | ProjectAction::DownloadDocument
            | ProjectAction::UpdateDocument => Role::Participant,
            ProjectAction::DeleteProject
            | ProjectAction::GrantAccess
            | ProjectAction::DeleteDocument => Role::Owner,
        }
    }
}

impl fmt::Display for ProjectAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProjectAction::ViewProject => "view project",
            ProjectAction::UpdateProject => "update project",
            ProjectAction::DeleteProject => "delete project",
            ProjectAction::GrantAccess => "grant access",
            ProjectAction::ListDocuments => "list documents",
            ProjectAction::UploadDocument => "upload document",
            ProjectAction::ViewDocument => "view document",
            ProjectAction::DownloadDocument => "download document",
            ProjectAction::UpdateDocument => "update document",
            ProjectAction::DeleteDocument => "delete document",
        };
        write!(f, "{name}")
    }
}
