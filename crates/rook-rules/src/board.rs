//! Board state, FEN encoding and legal move generation.

use std::fmt::Write as _;

use rook_core::{GameBoard, GameStatus};

use crate::error::{FenError, RuleError};
use crate::types::{Color, Move, MoveKind, Piece, Role, Square};

/// FEN of the standard starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

const KNIGHT_STEPS: [(i8, i8); 8] = [
    (1, 2),
    (2, 1),
    (2, -1),
    (1, -2),
    (-1, -2),
    (-2, -1),
    (-2, 1),
    (-1, 2),
];
const KING_STEPS: [(i8, i8); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];
const ROOK_DIRS: [(i8, i8); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const BISHOP_DIRS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];
const PROMOTIONS: [Role; 4] = [Role::Queen, Role::Rook, Role::Bishop, Role::Knight];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct CastlingRights {
    white_king: bool,
    white_queen: bool,
    black_king: bool,
    black_queen: bool,
}

impl CastlingRights {
    fn kingside(self, color: Color) -> bool {
        match color {
            Color::White => self.white_king,
            Color::Black => self.black_king,
        }
    }

    fn queenside(self, color: Color) -> bool {
        match color {
            Color::White => self.white_queen,
            Color::Black => self.black_queen,
        }
    }

    fn clear(&mut self, color: Color) {
        match color {
            Color::White => {
                self.white_king = false;
                self.white_queen = false;
            }
            Color::Black => {
                self.black_king = false;
                self.black_queen = false;
            }
        }
    }

    /// A rook leaving or being captured on its home corner loses that right.
    fn touch(&mut self, sq: Square) {
        match (sq.file(), sq.rank()) {
            (0, 0) => self.white_queen = false,
            (7, 0) => self.white_king = false,
            (0, 7) => self.black_queen = false,
            (7, 7) => self.black_king = false,
            _ => {}
        }
    }

    fn parse(field: &str) -> Result<Self, FenError> {
        let mut rights = Self::default();
        if field == "-" {
            return Ok(rights);
        }
        for c in field.chars() {
            match c {
                'K' => rights.white_king = true,
                'Q' => rights.white_queen = true,
                'k' => rights.black_king = true,
                'q' => rights.black_queen = true,
                _ => return Err(FenError::BadCastling(field.to_owned())),
            }
        }
        Ok(rights)
    }

    fn fen(self) -> String {
        let mut out = String::new();
        for (present, c) in [
            (self.white_king, 'K'),
            (self.white_queen, 'Q'),
            (self.black_king, 'k'),
            (self.black_queen, 'q'),
        ] {
            if present {
                out.push(c);
            }
        }
        if out.is_empty() {
            out.push('-');
        }
        out
    }
}

/// A complete chess position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    squares: [Option<Piece>; 64],
    turn: Color,
    castling: CastlingRights,
    en_passant: Option<Square>,
    halfmove_clock: u32,
    fullmove_number: u32,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// The standard starting position.
    pub fn new() -> Self {
        let mut squares = [None; 64];
        let back = [
            Role::Rook,
            Role::Knight,
            Role::Bishop,
            Role::Queen,
            Role::King,
            Role::Bishop,
            Role::Knight,
            Role::Rook,
        ];
        for (file, role) in (0u8..).zip(back) {
            squares[Square::new(file, 0).index()] = Some(Piece::new(Color::White, role));
            squares[Square::new(file, 1).index()] = Some(Piece::new(Color::White, Role::Pawn));
            squares[Square::new(file, 6).index()] = Some(Piece::new(Color::Black, Role::Pawn));
            squares[Square::new(file, 7).index()] = Some(Piece::new(Color::Black, role));
        }
        Self {
            squares,
            turn: Color::White,
            castling: CastlingRights {
                white_king: true,
                white_queen: true,
                black_king: true,
                black_queen: true,
            },
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }

    /// Parse a FEN string. The two clock fields may be omitted.
    pub fn from_fen(fen: &str) -> Result<Self, FenError> {
        let mut fields = fen.split_whitespace();
        let placement = fields.next().ok_or(FenError::Empty)?;
        let side = fields.next().ok_or(FenError::MissingField("side to move"))?;
        let castling = fields.next().ok_or(FenError::MissingField("castling rights"))?;
        let en_passant = fields.next().ok_or(FenError::MissingField("en passant square"))?;
        let halfmove_clock = parse_clock(fields.next(), 0)?;
        let fullmove_number = parse_clock(fields.next(), 1)?;
        if fields.next().is_some() {
            return Err(FenError::TrailingFields);
        }

        let mut squares = [None; 64];
        let ranks: Vec<&str> = placement.split('/').collect();
        if ranks.len() != 8 {
            return Err(FenError::BadPlacement(placement.to_owned()));
        }
        for (i, row) in ranks.iter().enumerate() {
            let rank = 7 - i as u8;
            let mut file = 0u8;
            for c in row.chars() {
                if let Some(skip) = c.to_digit(10) {
                    if !(1..=8).contains(&skip) {
                        return Err(FenError::BadPlacement(placement.to_owned()));
                    }
                    file += skip as u8;
                } else {
                    let piece = Piece::from_fen_char(c)
                        .ok_or_else(|| FenError::BadPlacement(placement.to_owned()))?;
                    if file >= 8 {
                        return Err(FenError::BadPlacement(placement.to_owned()));
                    }
                    squares[Square::new(file, rank).index()] = Some(piece);
                    file += 1;
                }
                if file > 8 {
                    return Err(FenError::BadPlacement(placement.to_owned()));
                }
            }
            if file != 8 {
                return Err(FenError::BadPlacement(placement.to_owned()));
            }
        }

        for color in [Color::White, Color::Black] {
            let kings = squares
                .iter()
                .filter(|p| **p == Some(Piece::new(color, Role::King)))
                .count();
            if kings != 1 {
                return Err(FenError::Kings(color));
            }
        }

        let turn = match side {
            "w" => Color::White,
            "b" => Color::Black,
            other => return Err(FenError::BadSide(other.to_owned())),
        };

        let en_passant = match en_passant {
            "-" => None,
            sq => {
                let sq: Square = sq
                    .parse()
                    .map_err(|_| FenError::BadEnPassant(sq.to_owned()))?;
                if sq.rank() != 2 && sq.rank() != 5 {
                    return Err(FenError::BadEnPassant(sq.to_string()));
                }
                Some(sq)
            }
        };

        Ok(Self {
            squares,
            turn,
            castling: CastlingRights::parse(castling)?,
            en_passant,
            halfmove_clock,
            fullmove_number,
        })
    }

    /// Serialize to FEN.
    pub fn to_fen(&self) -> String {
        let mut out = String::with_capacity(90);
        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                match self.piece_at(Square::new(file, rank)) {
                    Some(piece) => {
                        if empty > 0 {
                            let _ = write!(out, "{empty}");
                            empty = 0;
                        }
                        out.push(piece.fen_char());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                let _ = write!(out, "{empty}");
            }
            if rank > 0 {
                out.push('/');
            }
        }
        let side = match self.turn {
            Color::White => 'w',
            Color::Black => 'b',
        };
        let ep = self
            .en_passant
            .map_or_else(|| "-".to_owned(), |sq| sq.to_string());
        let _ = write!(
            out,
            " {side} {} {ep} {} {}",
            self.castling.fen(),
            self.halfmove_clock,
            self.fullmove_number
        );
        out
    }

    pub fn piece_at(&self, sq: Square) -> Option<Piece> {
        self.squares[sq.index()]
    }

    /// Side to move.
    pub fn turn(&self) -> Color {
        self.turn
    }

    fn king_square(&self, color: Color) -> Option<Square> {
        Square::all().find(|sq| self.piece_at(*sq) == Some(Piece::new(color, Role::King)))
    }

    /// Whether `color`'s king is attacked.
    pub fn in_check(&self, color: Color) -> bool {
        self.king_square(color)
            .is_some_and(|sq| self.is_attacked(sq, color.opposite()))
    }

    /// Whether any piece of `by` attacks `sq`.
    pub fn is_attacked(&self, sq: Square, by: Color) -> bool {
        let holds = |target: Option<Square>, role: Role| {
            target.is_some_and(|t| self.piece_at(t) == Some(Piece::new(by, role)))
        };

        let behind = -by.forward();
        if holds(sq.offset(-1, behind), Role::Pawn) || holds(sq.offset(1, behind), Role::Pawn) {
            return true;
        }
        if KNIGHT_STEPS
            .iter()
            .any(|&(df, dr)| holds(sq.offset(df, dr), Role::Knight))
        {
            return true;
        }
        if KING_STEPS
            .iter()
            .any(|&(df, dr)| holds(sq.offset(df, dr), Role::King))
        {
            return true;
        }
        let slider_hits = |dirs: &[(i8, i8)], roles: [Role; 2]| {
            dirs.iter().any(|&(df, dr)| {
                let mut cur = sq.offset(df, dr);
                while let Some(t) = cur {
                    if let Some(piece) = self.piece_at(t) {
                        return piece.color == by && roles.contains(&piece.role);
                    }
                    cur = t.offset(df, dr);
                }
                false
            })
        };
        slider_hits(&ROOK_DIRS, [Role::Rook, Role::Queen])
            || slider_hits(&BISHOP_DIRS, [Role::Bishop, Role::Queen])
    }

    /// All legal moves for the side to move.
    pub fn legal_moves(&self) -> Vec<Move> {
        let us = self.turn;
        self.pseudo_legal_moves()
            .into_iter()
            .filter(|mv| {
                let mut next = self.clone();
                next.play_unchecked(*mv);
                !next.in_check(us)
            })
            .collect()
    }

    fn pseudo_legal_moves(&self) -> Vec<Move> {
        let us = self.turn;
        let mut moves = Vec::with_capacity(48);
        for from in Square::all() {
            let Some(piece) = self.piece_at(from) else {
                continue;
            };
            if piece.color != us {
                continue;
            }
            match piece.role {
                Role::Pawn => self.pawn_moves(from, us, &mut moves),
                Role::Knight => self.step_moves(from, us, &KNIGHT_STEPS, &mut moves),
                Role::Bishop => self.slide_moves(from, us, &BISHOP_DIRS, &mut moves),
                Role::Rook => self.slide_moves(from, us, &ROOK_DIRS, &mut moves),
                Role::Queen => {
                    self.slide_moves(from, us, &ROOK_DIRS, &mut moves);
                    self.slide_moves(from, us, &BISHOP_DIRS, &mut moves);
                }
                Role::King => {
                    self.step_moves(from, us, &KING_STEPS, &mut moves);
                    self.castling_moves(from, us, &mut moves);
                }
            }
        }
        moves
    }

    fn pawn_moves(&self, from: Square, us: Color, moves: &mut Vec<Move>) {
        let dir = us.forward();
        let start_rank = if us == Color::White { 1 } else { 6 };
        let last_rank = if us == Color::White { 7 } else { 0 };

        let mut push = |to: Square, kind: MoveKind| {
            if to.rank() == last_rank {
                for role in PROMOTIONS {
                    moves.push(Move {
                        from,
                        to,
                        promotion: Some(role),
                        kind,
                    });
                }
            } else {
                moves.push(Move::new(from, to, kind));
            }
        };

        if let Some(one) = from.offset(0, dir) {
            if self.piece_at(one).is_none() {
                push(one, MoveKind::Normal);
                if from.rank() == start_rank {
                    if let Some(two) = one.offset(0, dir) {
                        if self.piece_at(two).is_none() {
                            push(two, MoveKind::DoublePush);
                        }
                    }
                }
            }
        }
        for df in [-1, 1] {
            let Some(to) = from.offset(df, dir) else {
                continue;
            };
            match self.piece_at(to) {
                Some(target) if target.color != us => push(to, MoveKind::Normal),
                None if self.en_passant == Some(to) => push(to, MoveKind::EnPassant),
                _ => {}
            }
        }
    }

    fn step_moves(&self, from: Square, us: Color, steps: &[(i8, i8)], moves: &mut Vec<Move>) {
        for &(df, dr) in steps {
            if let Some(to) = from.offset(df, dr) {
                if self.piece_at(to).map_or(true, |p| p.color != us) {
                    moves.push(Move::new(from, to, MoveKind::Normal));
                }
            }
        }
    }

    fn slide_moves(&self, from: Square, us: Color, dirs: &[(i8, i8)], moves: &mut Vec<Move>) {
        for &(df, dr) in dirs {
            let mut cur = from.offset(df, dr);
            while let Some(to) = cur {
                match self.piece_at(to) {
                    None => moves.push(Move::new(from, to, MoveKind::Normal)),
                    Some(p) => {
                        if p.color != us {
                            moves.push(Move::new(from, to, MoveKind::Normal));
                        }
                        break;
                    }
                }
                cur = to.offset(df, dr);
            }
        }
    }

    fn castling_moves(&self, from: Square, us: Color, moves: &mut Vec<Move>) {
        let rank = us.back_rank();
        if from != Square::new(4, rank) {
            return;
        }
        let them = us.opposite();
        let empty = |file: u8| self.piece_at(Square::new(file, rank)).is_none();
        let safe = |file: u8| !self.is_attacked(Square::new(file, rank), them);
        let own_rook = |file: u8| self.piece_at(Square::new(file, rank)) == Some(Piece::new(us, Role::Rook));

        if self.castling.kingside(us)
            && own_rook(7)
            && empty(5)
            && empty(6)
            && safe(4)
            && safe(5)
            && safe(6)
        {
            moves.push(Move::new(from, Square::new(6, rank), MoveKind::CastleKingside));
        }
        if self.castling.queenside(us)
            && own_rook(0)
            && empty(1)
            && empty(2)
            && empty(3)
            && safe(4)
            && safe(3)
            && safe(2)
        {
            moves.push(Move::new(from, Square::new(2, rank), MoveKind::CastleQueenside));
        }
    }

    /// Play a move already known to be legal.
    pub(crate) fn play_unchecked(&mut self, mv: Move) {
        let us = self.turn;
        let Some(piece) = self.squares[mv.from.index()].take() else {
            return;
        };
        let captured = self.squares[mv.to.index()].is_some();
        let mut reset_clock = captured || piece.role == Role::Pawn;

        match mv.kind {
            MoveKind::EnPassant => {
                let victim = Square::new(mv.to.file(), mv.from.rank());
                self.squares[victim.index()] = None;
                reset_clock = true;
            }
            MoveKind::CastleKingside => {
                let rank = us.back_rank();
                let rook = self.squares[Square::new(7, rank).index()].take();
                self.squares[Square::new(5, rank).index()] = rook;
            }
            MoveKind::CastleQueenside => {
                let rank = us.back_rank();
                let rook = self.squares[Square::new(0, rank).index()].take();
                self.squares[Square::new(3, rank).index()] = rook;
            }
            MoveKind::Normal | MoveKind::DoublePush => {}
        }

        let placed = mv.promotion.map_or(piece, |role| Piece::new(us, role));
        self.squares[mv.to.index()] = Some(placed);

        self.en_passant = (mv.kind == MoveKind::DoublePush)
            .then(|| Square::new(mv.from.file(), (mv.from.rank() + mv.to.rank()) / 2));

        if piece.role == Role::King {
            self.castling.clear(us);
        }
        self.castling.touch(mv.from);
        self.castling.touch(mv.to);

        self.halfmove_clock = if reset_clock {
            0
        } else {
            self.halfmove_clock + 1
        };
        if us == Color::Black {
            self.fullmove_number += 1;
        }
        self.turn = us.opposite();
    }

    /// Play a move, rejecting it unless it is legal here.
    pub fn play(&mut self, mv: Move) -> Result<String, RuleError> {
        if !self.legal_moves().contains(&mv) {
            return Err(RuleError::IllegalMove {
                from: mv.from,
                to: mv.to,
            });
        }
        self.play_unchecked(mv);
        Ok(self.to_fen())
    }

    /// Play a move given as two square names. Pawns reaching the last rank
    /// become queens.
    pub fn play_squares(&mut self, origin: &str, destination: &str) -> Result<String, RuleError> {
        let from: Square = origin.parse()?;
        let to: Square = destination.parse()?;
        let piece = self.piece_at(from).ok_or(RuleError::NoPiece(from))?;
        if piece.color != self.turn {
            return Err(RuleError::WrongTurn { to_move: self.turn });
        }
        let legal = self.legal_moves();
        if legal.is_empty() {
            return Err(RuleError::GameOver);
        }
        let mv = legal
            .into_iter()
            .filter(|m| m.from == from && m.to == to)
            .find(|m| m.promotion.is_none() || m.promotion == Some(Role::Queen))
            .ok_or(RuleError::IllegalMove { from, to })?;
        self.play_unchecked(mv);
        Ok(self.to_fen())
    }

    pub fn is_checkmate(&self) -> bool {
        self.in_check(self.turn) && self.legal_moves().is_empty()
    }

    pub fn is_stalemate(&self) -> bool {
        !self.in_check(self.turn) && self.legal_moves().is_empty()
    }
}

fn parse_clock(field: Option<&str>, default: u32) -> Result<u32, FenError> {
    field.map_or(Ok(default), |raw| {
        raw.parse().map_err(|_| FenError::BadClock(raw.to_owned()))
    })
}

impl GameBoard for Board {
    type Error = RuleError;

    fn from_position(encoding: &str) -> Result<Self, Self::Error> {
        Ok(Self::from_fen(encoding)?)
    }

    fn apply_move(&mut self, origin: &str, destination: &str) -> Result<String, Self::Error> {
        self.play_squares(origin, destination)
    }

    fn position(&self) -> String {
        self.to_fen()
    }

    fn status(&self) -> GameStatus {
        let check = self.in_check(self.turn);
        GameStatus {
            check,
            checkmate: check && self.legal_moves().is_empty(),
        }
    }
}
